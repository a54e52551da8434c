//! Divided-investment averaging.
//!
//! The budget is split into `division` units. Each round buys roughly one unit
//! around the average price and the star price, and offers the position back
//! at the star price (a quarter) and at `avg x (1 + sell_gain)` (the rest).
//! `T`, the position cost measured in units, picks the phase:
//!
//! | T | Orders |
//! |---|--------|
//! | 0 | initial buy at +20% plus a 1-share ladder down to -20% |
//! | (0, division/2] | AvgBuy + StarBuy, StarSell + AllSell |
//! | (division/2, division-1] | StarBuy, StarSell + AllSell |
//! | > division-1 | quarter market-on-close sell |

use crate::error::{EngineError, EngineResult};
use crate::model::{AveragingState, FillSummary, OrderIntent, OrderKind, OrderSide, OrderTag};
use crate::utils::decimal::{
    is_flat, percent_to_rate, round_cents, round_shares, safe_div, shares_affordable,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

/// Cap on buy prices relative to the current price; brokers reject limits far above it.
const BUY_PRICE_CAP: Decimal = dec!(1.19);
const INIT_PRICE_FACTOR: Decimal = dec!(1.2);
const INIT_LADDER_FLOOR: Decimal = dec!(0.8);
/// Longest initial ladder accepted; longer ones mean the price is too low for the unit.
const MAX_INIT_RUNGS: usize = 1000;

/// Averaging parameters as stored on the strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct AveragingParams {
    pub ticker: String,
    #[serde(default = "default_division")]
    pub division: u32,
    /// Percent, 20 = 20%
    #[serde(default = "default_sell_gain")]
    pub sell_gain: Decimal,
    #[serde(default = "default_initial_investment")]
    pub initial_investment: Decimal,
    /// Percent of realized profit added back to the investment
    #[serde(default = "default_reinvestment_rate")]
    pub reinvestment_rate: Decimal,
}

fn default_division() -> u32 {
    20
}

fn default_sell_gain() -> Decimal {
    dec!(20)
}

fn default_initial_investment() -> Decimal {
    dec!(10000)
}

fn default_reinvestment_rate() -> Decimal {
    dec!(50)
}

impl AveragingParams {
    pub fn validate(&self) -> EngineResult<()> {
        if self.division < 2 {
            return Err(EngineError::InvalidParams(format!(
                "division must be at least 2, got {}",
                self.division
            )));
        }
        if self.initial_investment <= Decimal::ZERO {
            return Err(EngineError::InvalidParams(
                "initial_investment must be positive".to_string(),
            ));
        }
        if self.sell_gain <= Decimal::ZERO {
            return Err(EngineError::InvalidParams("sell_gain must be positive".to_string()));
        }
        Ok(())
    }
}

/// Averaging order generator and state calculator.
#[derive(Debug, Clone)]
pub struct AveragingStrategy {
    params: AveragingParams,
    division: Decimal,
    sell_gain: Decimal,
    reinvestment_rate: Decimal,
}

impl AveragingStrategy {
    pub fn new(params: AveragingParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            division: Decimal::from(params.division),
            sell_gain: percent_to_rate(params.sell_gain),
            reinvestment_rate: percent_to_rate(params.reinvestment_rate),
            params,
        })
    }

    pub fn params(&self) -> &AveragingParams {
        &self.params
    }

    /// Flat position holding the whole initial investment in cash.
    pub fn initial_state(&self) -> AveragingState {
        let investment = self.params.initial_investment;
        AveragingState {
            t: Decimal::ZERO,
            star: self.sell_gain,
            investment,
            unit_investment: investment / self.division,
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            balance: investment,
            equity: investment,
            daily_profit: Decimal::ZERO,
        }
    }

    /// Orders for the next round. Zero-quantity orders are dropped.
    pub fn generate_orders(
        &self,
        state: &AveragingState,
        current_price: Decimal,
    ) -> EngineResult<Vec<OrderIntent>> {
        if current_price <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "current price must be positive, got {current_price}"
            )));
        }
        if state.t > Decimal::ZERO && state.avg_price <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "avg_price is missing while T = {}",
                state.t
            )));
        }

        let unit = self.unit_investment(state)?;
        let t = state.t;

        let orders = if t == Decimal::ZERO {
            self.initial_ladder(unit, current_price)?
        } else if t <= self.division / dec!(2) {
            self.first_half(state, unit, current_price)
        } else if t <= self.division - Decimal::ONE {
            self.second_half(state, unit, current_price)
        } else {
            vec![OrderIntent {
                side: OrderSide::Sell,
                kind: OrderKind::Moc,
                tag: OrderTag::QtrSell,
                quantity: quarter(state.quantity),
                price: Decimal::ZERO,
            }]
        };

        let orders: Vec<OrderIntent> = orders
            .into_iter()
            .filter(|o| o.quantity > Decimal::ZERO)
            .collect();

        debug!(
            t = %state.t,
            star = %state.star,
            %unit,
            %current_price,
            orders = orders.len(),
            "Averaging orders generated"
        );
        Ok(orders)
    }

    /// One investment unit, falling back to the initial investment.
    fn unit_investment(&self, state: &AveragingState) -> EngineResult<Decimal> {
        let investment = if state.investment > Decimal::ZERO {
            state.investment
        } else {
            self.params.initial_investment
        };
        let unit = investment / self.division;
        if unit <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "unit investment must be positive, got {unit}"
            )));
        }
        Ok(unit)
    }

    fn initial_ladder(
        &self,
        unit: Decimal,
        current_price: Decimal,
    ) -> EngineResult<Vec<OrderIntent>> {
        let mut orders = Vec::new();
        let mut price = round_cents(current_price * INIT_PRICE_FACTOR);
        let mut quantity = shares_affordable(unit, price);
        orders.push(OrderIntent::loc(OrderSide::Buy, OrderTag::Init, price, quantity));

        let floor = current_price * INIT_LADDER_FLOOR;
        while price > floor {
            if orders.len() > MAX_INIT_RUNGS {
                return Err(EngineError::InvalidState(format!(
                    "initial ladder exceeds {MAX_INIT_RUNGS} orders at price {current_price} \
                     with unit {unit}"
                )));
            }
            quantity += Decimal::ONE;
            price = round_cents(unit / quantity);
            orders.push(OrderIntent::loc(
                OrderSide::Buy,
                OrderTag::InitDrop,
                price,
                Decimal::ONE,
            ));
        }
        Ok(orders)
    }

    /// Star price and average price, both capped for buying.
    fn buy_references(&self, state: &AveragingState, current_price: Decimal) -> (Decimal, Decimal) {
        let base = if state.avg_price > dec!(0.001) {
            state.avg_price
        } else {
            current_price
        };
        let star_price = round_cents(base * (Decimal::ONE + state.star));
        let cap = round_cents(current_price * BUY_PRICE_CAP);
        (star_price.min(cap), state.avg_price.min(cap))
    }

    /// StarSell at one cent above the star buy, AllSell for the remainder.
    fn exit_orders(&self, state: &AveragingState, star_buy: Decimal) -> [OrderIntent; 2] {
        let star_sell_qty = quarter(state.quantity);
        let all_sell_price = if state.avg_price > Decimal::ZERO {
            round_cents(state.avg_price * (Decimal::ONE + self.sell_gain))
        } else {
            Decimal::ZERO
        };
        [
            OrderIntent::loc(
                OrderSide::Sell,
                OrderTag::StarSell,
                star_buy + dec!(0.01),
                star_sell_qty,
            ),
            OrderIntent::loc(
                OrderSide::Sell,
                OrderTag::AllSell,
                all_sell_price,
                (state.quantity - star_sell_qty).max(Decimal::ZERO),
            ),
        ]
    }

    fn first_half(
        &self,
        state: &AveragingState,
        unit: Decimal,
        current_price: Decimal,
    ) -> Vec<OrderIntent> {
        let (star_buy, avg_buy) = self.buy_references(state, current_price);
        let avg_qty = round_shares(safe_div(unit / dec!(2), avg_buy));
        let remaining = unit - avg_buy * avg_qty;
        let star_qty = round_shares(safe_div(remaining, star_buy));

        let mut orders = vec![
            OrderIntent::loc(OrderSide::Buy, OrderTag::AvgBuy, avg_buy, avg_qty),
            OrderIntent::loc(OrderSide::Buy, OrderTag::StarBuy, star_buy, star_qty),
        ];
        orders.extend(self.exit_orders(state, star_buy));
        orders
    }

    fn second_half(
        &self,
        state: &AveragingState,
        unit: Decimal,
        current_price: Decimal,
    ) -> Vec<OrderIntent> {
        let (star_buy, _) = self.buy_references(state, current_price);
        let star_qty = round_shares(safe_div(unit, star_buy));

        let mut orders = vec![OrderIntent::loc(
            OrderSide::Buy,
            OrderTag::StarBuy,
            star_buy,
            star_qty,
        )];
        orders.extend(self.exit_orders(state, star_buy));
        orders
    }

    /// State after a round's fills. Returns the new state and the cycle it belongs to.
    pub fn next_state(
        &self,
        previous: &AveragingState,
        cycle: u32,
        fills: &FillSummary,
        current_price: Decimal,
    ) -> (AveragingState, u32) {
        let old_avg = previous.avg_price;
        let remaining_qty = previous.quantity - fills.sell.quantity;
        let new_qty = remaining_qty + fills.buy.quantity;
        let new_avg = if is_flat(new_qty) {
            Decimal::ZERO
        } else {
            round_cents((remaining_qty * old_avg + fills.buy.value) / new_qty)
        };

        let daily_profit = fills.realized_profit(old_avg);
        let investment = round_cents(previous.investment + self.reinvestment_rate * daily_profit);
        let balance = round_cents(previous.balance + fills.sell.value - fills.buy.value);

        if is_flat(new_qty) {
            let state = AveragingState {
                t: Decimal::ZERO,
                star: self.sell_gain,
                investment,
                unit_investment: investment / self.division,
                quantity: Decimal::ZERO,
                avg_price: Decimal::ZERO,
                balance,
                equity: balance,
                daily_profit: Decimal::ZERO,
            };
            return (state, cycle + 1);
        }

        let unit_investment = round_cents(investment / self.division);
        let t = if unit_investment > Decimal::ZERO && new_qty > Decimal::ZERO {
            round_cents(new_avg * new_qty / unit_investment)
        } else {
            Decimal::ZERO
        };
        let star = round_cents(self.sell_gain - t * self.sell_gain / self.division * dec!(2));

        let state = AveragingState {
            t,
            star,
            investment,
            unit_investment,
            quantity: new_qty,
            avg_price: new_avg,
            balance,
            equity: balance + new_qty * current_price,
            daily_profit,
        };
        (state, cycle)
    }
}

fn quarter(quantity: Decimal) -> Decimal {
    if quantity > Decimal::ZERO {
        round_shares(quantity / dec!(4))
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FillTotals;

    fn strategy() -> AveragingStrategy {
        AveragingStrategy::new(AveragingParams {
            ticker: "TQQQ".to_string(),
            division: 20,
            sell_gain: dec!(20),
            initial_investment: dec!(10000),
            reinvestment_rate: dec!(50),
        })
        .unwrap()
    }

    fn holding(quantity: Decimal, avg_price: Decimal) -> AveragingState {
        let strategy = strategy();
        let mut state = strategy.initial_state();
        state.quantity = quantity;
        state.avg_price = avg_price;
        state.t = round_cents(avg_price * quantity / state.unit_investment);
        state.star = round_cents(dec!(0.2) - state.t * dec!(0.2) / dec!(20) * dec!(2));
        state
    }

    #[test]
    fn test_initial_state() {
        let state = strategy().initial_state();
        assert_eq!(state.t, Decimal::ZERO);
        assert_eq!(state.star, dec!(0.2));
        assert_eq!(state.unit_investment, dec!(500));
        assert_eq!(state.balance, dec!(10000));
        assert_eq!(state.quantity, Decimal::ZERO);
    }

    #[test]
    fn test_cold_start_ladder() {
        let strategy = strategy();
        let orders = strategy
            .generate_orders(&strategy.initial_state(), dec!(100))
            .unwrap();

        assert_eq!(orders[0].tag, OrderTag::Init);
        assert_eq!(orders[0].price, dec!(120.00));
        assert_eq!(orders[0].quantity, dec!(4));

        let drops = &orders[1..];
        assert!(!drops.is_empty());
        assert!(drops.iter().all(|o| o.tag == OrderTag::InitDrop && o.quantity == Decimal::ONE));
        assert!(drops.windows(2).all(|w| w[1].price < w[0].price));
        assert_eq!(drops.last().unwrap().price, dec!(71.43));
        assert!(drops[..drops.len() - 1].iter().all(|o| o.price > dec!(80)));
        assert_eq!(
            drops.iter().map(|o| o.price).collect::<Vec<_>>(),
            vec![dec!(100), dec!(83.33), dec!(71.43)]
        );
        assert!(orders.iter().all(|o| o.side == OrderSide::Buy && o.kind == OrderKind::Loc));
    }

    #[test]
    fn test_cold_start_skips_unaffordable_init_order() {
        let strategy = strategy();
        // 1.2 x 600 = 720 exceeds the 500 unit
        let orders = strategy
            .generate_orders(&strategy.initial_state(), dec!(600))
            .unwrap();
        assert!(orders.iter().all(|o| o.tag == OrderTag::InitDrop));
        assert_eq!(orders[0].price, dec!(500));
    }

    #[test]
    fn test_penny_price_ladder_rejected() {
        let strategy = strategy();
        let err = strategy
            .generate_orders(&strategy.initial_state(), dec!(0.01))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[test]
    fn test_low_price_ladder_within_bound() {
        let strategy = strategy();
        // 208 shares at 2.40, then 1-share rungs down to 1.60
        let orders = strategy
            .generate_orders(&strategy.initial_state(), dec!(2))
            .unwrap();
        assert!(orders.len() > 100 && orders.len() <= MAX_INIT_RUNGS + 1);
        assert!(orders.last().unwrap().price <= dec!(1.6));
    }

    #[test]
    fn test_first_half_orders() {
        let strategy = strategy();
        // 40 shares at 50 = 2000, T = 4
        let state = holding(dec!(40), dec!(50));
        assert_eq!(state.t, dec!(4));
        assert_eq!(state.star, dec!(0.12));

        let orders = strategy.generate_orders(&state, dec!(48)).unwrap();
        let tags: Vec<_> = orders.iter().map(|o| o.tag).collect();
        assert_eq!(
            tags,
            vec![OrderTag::AvgBuy, OrderTag::StarBuy, OrderTag::StarSell, OrderTag::AllSell]
        );

        // avg 50 is under the 57.12 cap; 250 / 50 = 5 shares
        assert_eq!(orders[0].price, dec!(50));
        assert_eq!(orders[0].quantity, dec!(5));
        // star 56.00, remaining 250 / 56 = 4.46 -> 4
        assert_eq!(orders[1].price, dec!(56.00));
        assert_eq!(orders[1].quantity, dec!(4));
        assert_eq!(orders[2].price, dec!(56.01));
        assert_eq!(orders[2].quantity, dec!(10));
        assert_eq!(orders[3].price, dec!(60.00));
        assert_eq!(orders[3].quantity, dec!(30));
    }

    #[test]
    fn test_buy_prices_capped_near_market() {
        let strategy = strategy();
        let state = holding(dec!(40), dec!(50));
        // market fell to 30: cap is 35.70
        let orders = strategy.generate_orders(&state, dec!(30)).unwrap();
        assert_eq!(orders[0].price, dec!(35.70));
        assert_eq!(orders[1].price, dec!(35.70));
        assert_eq!(orders[2].price, dec!(35.71));
        // exits stay anchored on the average
        assert_eq!(orders[3].price, dec!(60.00));
    }

    #[test]
    fn test_second_half_has_single_buy() {
        let strategy = strategy();
        // 120 shares at 50 = 6000, T = 12
        let state = holding(dec!(120), dec!(50));
        let orders = strategy.generate_orders(&state, dec!(50)).unwrap();

        let buys: Vec<_> = orders.iter().filter(|o| o.side == OrderSide::Buy).collect();
        assert_eq!(buys.len(), 1);
        assert_eq!(buys[0].tag, OrderTag::StarBuy);
        // star = 0.2 - 12 x 0.02 = -0.04 -> 48.00, 500 / 48 = 10.4 -> 10
        assert_eq!(buys[0].price, dec!(48.00));
        assert_eq!(buys[0].quantity, dec!(10));
        assert_eq!(orders.len(), 3);
    }

    #[test]
    fn test_loss_cut_sells_quarter_at_close() {
        let strategy = strategy();
        // 200 shares at 50 = 10000, T = 20
        let state = holding(dec!(200), dec!(50));
        let orders = strategy.generate_orders(&state, dec!(45)).unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].tag, OrderTag::QtrSell);
        assert_eq!(orders[0].kind, OrderKind::Moc);
        assert_eq!(orders[0].price, Decimal::ZERO);
        assert_eq!(orders[0].quantity, dec!(50));
    }

    #[test]
    fn test_missing_average_is_invalid_state() {
        let strategy = strategy();
        let mut state = holding(dec!(40), dec!(50));
        state.avg_price = Decimal::ZERO;
        assert!(matches!(
            strategy.generate_orders(&state, dec!(50)),
            Err(EngineError::InvalidState(_))
        ));
        assert!(strategy.generate_orders(&strategy.initial_state(), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_next_state_after_buys() {
        let strategy = strategy();
        let fills = FillSummary {
            buy: FillTotals { quantity: dec!(4), value: dec!(400) },
            sell: FillTotals::default(),
        };

        let (state, cycle) = strategy.next_state(&strategy.initial_state(), 1, &fills, dec!(101));
        assert_eq!(cycle, 1);
        assert_eq!(state.quantity, dec!(4));
        assert_eq!(state.avg_price, dec!(100));
        assert_eq!(state.balance, dec!(9600));
        assert_eq!(state.equity, dec!(10004));
        // 400 / 500
        assert_eq!(state.t, dec!(0.80));
        assert_eq!(state.star, dec!(0.18));
        assert_eq!(state.investment, dec!(10000));
    }

    #[test]
    fn test_next_state_reinvests_profit() {
        let strategy = strategy();
        let previous = holding(dec!(40), dec!(50));
        let fills = FillSummary {
            buy: FillTotals::default(),
            sell: FillTotals { quantity: dec!(10), value: dec!(560) },
        };

        let (state, _) = strategy.next_state(&previous, 3, &fills, dec!(56));
        assert_eq!(state.daily_profit, dec!(60));
        assert_eq!(state.investment, dec!(10030));
        assert_eq!(state.unit_investment, dec!(501.50));
        assert_eq!(state.quantity, dec!(30));
        assert_eq!(state.avg_price, dec!(50));
        assert_eq!(state.balance, dec!(10560));
    }

    #[test]
    fn test_full_exit_resets_and_advances_cycle() {
        let strategy = strategy();
        let previous = holding(dec!(40), dec!(50));
        let fills = FillSummary {
            buy: FillTotals::default(),
            sell: FillTotals { quantity: dec!(40), value: dec!(2400) },
        };

        let (state, cycle) = strategy.next_state(&previous, 3, &fills, dec!(60));
        assert_eq!(cycle, 4);
        assert_eq!(state.t, Decimal::ZERO);
        assert_eq!(state.star, dec!(0.2));
        assert_eq!(state.quantity, Decimal::ZERO);
        assert_eq!(state.avg_price, Decimal::ZERO);
        assert_eq!(state.daily_profit, Decimal::ZERO);
        assert_eq!(state.investment, dec!(10200));
        assert_eq!(state.equity, state.balance);
    }

    #[test]
    fn test_next_state_is_deterministic() {
        let strategy = strategy();
        let previous = holding(dec!(40), dec!(50));
        let fills = FillSummary {
            buy: FillTotals { quantity: dec!(5), value: dec!(240) },
            sell: FillTotals { quantity: dec!(10), value: dec!(560) },
        };

        let first = strategy.next_state(&previous, 2, &fills, dec!(48));
        let second = strategy.next_state(&previous, 2, &fills, dec!(48));
        assert_eq!(first, second);
    }

    #[test]
    fn test_params_validation() {
        let params: AveragingParams =
            serde_json::from_value(serde_json::json!({"ticker": "SOXL", "division": 40})).unwrap();
        assert_eq!(params.sell_gain, dec!(20));
        assert!(AveragingStrategy::new(params).is_ok());

        let params: AveragingParams =
            serde_json::from_value(serde_json::json!({"ticker": "SOXL", "division": 1})).unwrap();
        assert!(matches!(
            AveragingStrategy::new(params),
            Err(EngineError::InvalidParams(_))
        ));
    }
}
