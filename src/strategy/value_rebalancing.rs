//! Value rebalancing.
//!
//! The position is steered toward a target value `V` that grows every period
//! with the cash pool and a periodic contribution. Shares are bought one at a
//! time on a ladder below the lower band and sold one at a time on a ladder
//! above the upper band.

use crate::error::{EngineError, EngineResult};
use crate::model::{FillSummary, OrderIntent, OrderSide, OrderTag, ValueRebalancingState};
use crate::utils::decimal::{is_flat, percent_to_rate, round_cents};
use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::debug;

const BUY_PRICE_CAP: Decimal = dec!(1.2);

/// Value-rebalancing parameters as stored on the strategy.
#[derive(Debug, Clone, Deserialize)]
pub struct ValueRebalancingParams {
    pub ticker: String,
    #[serde(default = "default_initial_investment")]
    pub initial_investment: Decimal,
    /// Contribution added to pool and target at every period boundary
    #[serde(default = "default_periodic_investment")]
    pub periodic_investment: Decimal,
    /// Growth divisor; larger values grow V more slowly
    #[serde(default = "default_g_factor")]
    pub g_factor: Decimal,
    /// Upper band, percent
    #[serde(default = "default_band")]
    pub u_band: Decimal,
    /// Lower band, percent
    #[serde(default = "default_band")]
    pub l_band: Decimal,
    /// Share of the pool tradable per day, percent
    #[serde(default = "default_limit_rate")]
    pub buy_limit_rate: Decimal,
    /// Share of the position sellable per day, percent
    #[serde(default = "default_limit_rate")]
    pub sell_limit_rate: Decimal,
    #[serde(default = "default_max_daily_orders")]
    pub max_daily_orders: usize,
    #[serde(default = "default_sell_ladder_cap")]
    pub sell_ladder_cap: u32,
    #[serde(default = "default_period_days")]
    pub period_days: u32,
    /// Add the valuation correction term to the growth rate
    #[serde(default)]
    pub advanced: bool,
}

fn default_initial_investment() -> Decimal {
    dec!(10000)
}

fn default_periodic_investment() -> Decimal {
    dec!(400)
}

fn default_g_factor() -> Decimal {
    dec!(13)
}

fn default_band() -> Decimal {
    dec!(15)
}

fn default_limit_rate() -> Decimal {
    dec!(25)
}

fn default_max_daily_orders() -> usize {
    5
}

fn default_sell_ladder_cap() -> u32 {
    10
}

fn default_period_days() -> u32 {
    14
}

impl ValueRebalancingParams {
    pub fn validate(&self) -> EngineResult<()> {
        let invalid = |msg: &str| Err(EngineError::InvalidParams(msg.to_string()));
        if self.initial_investment <= Decimal::ZERO {
            return invalid("initial_investment must be positive");
        }
        if self.g_factor <= Decimal::ZERO {
            return invalid("g_factor must be positive");
        }
        if self.l_band < Decimal::ZERO || self.l_band >= dec!(100) || self.u_band < Decimal::ZERO {
            return invalid("bands must be within [0, 100)");
        }
        if self.max_daily_orders == 0 {
            return invalid("max_daily_orders must be at least 1");
        }
        if self.period_days == 0 {
            return invalid("period_days must be at least 1");
        }
        Ok(())
    }
}

/// Value-rebalancing order generator and state calculator.
#[derive(Debug, Clone)]
pub struct ValueRebalancingStrategy {
    params: ValueRebalancingParams,
    u_band: Decimal,
    l_band: Decimal,
    buy_limit_rate: Decimal,
    sell_limit_rate: Decimal,
}

impl ValueRebalancingStrategy {
    pub fn new(params: ValueRebalancingParams) -> EngineResult<Self> {
        params.validate()?;
        Ok(Self {
            u_band: percent_to_rate(params.u_band),
            l_band: percent_to_rate(params.l_band),
            buy_limit_rate: percent_to_rate(params.buy_limit_rate),
            sell_limit_rate: percent_to_rate(params.sell_limit_rate),
            params,
        })
    }

    pub fn params(&self) -> &ValueRebalancingParams {
        &self.params
    }

    /// Local calendar days a snapshot stays open.
    pub fn period_days(&self) -> u32 {
        self.params.period_days
    }

    /// No shares, the whole investment in the pool.
    pub fn initial_state(&self) -> ValueRebalancingState {
        let investment = self.params.initial_investment;
        ValueRebalancingState {
            v: investment,
            quantity: Decimal::ZERO,
            pool: investment,
            avg_price: Decimal::ZERO,
            equity: investment,
            total_investment: investment,
            cycle_profit: Decimal::ZERO,
        }
    }

    /// Buy and sell ladders for the current band, merged per side.
    pub fn generate_orders(
        &self,
        state: &ValueRebalancingState,
        current_price: Decimal,
    ) -> EngineResult<Vec<OrderIntent>> {
        if current_price <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "current price must be positive, got {current_price}"
            )));
        }
        if state.v <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "target value must be positive, got {}",
                state.v
            )));
        }

        let buys = self.buy_ladder(state, current_price);
        let sells = self.sell_ladder(state);
        debug!(
            v = %state.v,
            quantity = %state.quantity,
            pool = %state.pool,
            %current_price,
            buy_rungs = buys.len(),
            sell_rungs = sells.len(),
            "Value-rebalancing ladders built"
        );

        let mut orders = merge_orders(buys, self.params.max_daily_orders);
        orders.extend(merge_orders(sells, self.params.max_daily_orders));
        Ok(orders)
    }

    fn buy_ladder(&self, state: &ValueRebalancingState, current_price: Decimal) -> Vec<OrderIntent> {
        let lower = state.v * (Decimal::ONE - self.l_band);
        let buy_limit = self.buy_limit_rate * state.pool;
        let cap = round_cents(current_price * BUY_PRICE_CAP);
        let rung_price = |n: Decimal| {
            let shares = state.quantity + n;
            if shares > Decimal::ZERO {
                cap.min(round_cents(lower / shares))
            } else {
                Decimal::ZERO
            }
        };

        let mut orders = Vec::new();
        let mut n = Decimal::ONE;
        let mut price = rung_price(n);
        let mut spent = price;
        while spent <= buy_limit {
            if price <= Decimal::ZERO {
                break;
            }
            orders.push(OrderIntent::loc(OrderSide::Buy, OrderTag::VrBuy, price, Decimal::ONE));
            n += Decimal::ONE;
            price = rung_price(n);
            spent += price;
        }
        orders
    }

    fn sell_ladder(&self, state: &ValueRebalancingState) -> Vec<OrderIntent> {
        let upper = state.v * (Decimal::ONE + self.u_band);
        let sell_limit = self.sell_limit_rate * state.quantity;
        let cap = Decimal::from(self.params.sell_ladder_cap);

        let mut orders = Vec::new();
        let mut n = Decimal::ONE;
        while state.quantity - n > Decimal::ZERO && n <= sell_limit && n <= cap {
            let price = round_cents(upper / (state.quantity - n));
            orders.push(OrderIntent::loc(OrderSide::Sell, OrderTag::VrSell, price, Decimal::ONE));
            n += Decimal::ONE;
        }
        orders
    }

    /// Position after a period's fills, fills applied to quantity, average and pool.
    fn apply_fills(
        &self,
        previous: &ValueRebalancingState,
        fills: &FillSummary,
    ) -> (Decimal, Decimal, Decimal) {
        let remaining = previous.quantity - fills.sell.quantity;
        let quantity = remaining + fills.buy.quantity;
        let avg_price = if is_flat(quantity) {
            Decimal::ZERO
        } else {
            round_cents((remaining * previous.avg_price + fills.buy.value) / quantity)
        };
        let pool = previous.pool - fills.buy.value + fills.sell.value;
        (quantity.max(Decimal::ZERO), avg_price, pool)
    }

    /// Position part-way through a period: fills applied, target unchanged.
    pub fn interim_state(
        &self,
        previous: &ValueRebalancingState,
        fills: &FillSummary,
        current_price: Decimal,
    ) -> ValueRebalancingState {
        let (quantity, avg_price, pool) = self.apply_fills(previous, fills);
        ValueRebalancingState {
            v: previous.v,
            quantity,
            pool,
            avg_price,
            equity: round_cents(quantity * current_price + pool),
            total_investment: previous.total_investment,
            cycle_profit: fills.realized_profit(previous.avg_price),
        }
    }

    /// State for the next period: fills applied, target grown, contribution added.
    pub fn next_state(
        &self,
        previous: &ValueRebalancingState,
        fills: &FillSummary,
        current_price: Decimal,
    ) -> EngineResult<ValueRebalancingState> {
        if previous.v <= Decimal::ZERO {
            return Err(EngineError::InvalidState(format!(
                "target value must be positive, got {}",
                previous.v
            )));
        }

        let g = self.params.g_factor;
        let (quantity, avg_price, pool) = self.apply_fills(previous, fills);

        let mut rate = Decimal::ONE + pool / previous.v / g;
        if self.params.advanced {
            let root = g.sqrt().ok_or_else(|| {
                EngineError::InvalidParams(format!("cannot take square root of g_factor {g}"))
            })?;
            rate += (quantity * current_price / previous.v - Decimal::ONE) / (dec!(2) * root);
        }

        let periodic = self.params.periodic_investment;
        let new_pool = round_cents(pool + periodic);
        Ok(ValueRebalancingState {
            v: round_cents(previous.v * rate + periodic),
            quantity,
            pool: new_pool,
            avg_price,
            equity: round_cents(quantity * current_price + new_pool),
            total_investment: previous.total_investment + periodic,
            cycle_profit: fills.realized_profit(previous.avg_price),
        })
    }
}

/// Merge a ladder into at most `buckets` orders.
///
/// Rungs are split into consecutive groups as evenly as possible, larger groups
/// first. Each merged order keeps the first rung's price and the group's total
/// quantity.
pub fn merge_orders(orders: Vec<OrderIntent>, buckets: usize) -> Vec<OrderIntent> {
    if buckets == 0 || orders.len() <= buckets {
        return orders;
    }

    let base = orders.len() / buckets;
    let extra = orders.len() % buckets;
    let mut rungs = orders.into_iter();
    let mut merged = Vec::with_capacity(buckets);

    for bucket in 0..buckets {
        let size = base + usize::from(bucket < extra);
        let mut group = rungs.by_ref().take(size);
        if let Some(mut head) = group.next() {
            head.quantity += group.map(|o| o.quantity).sum::<Decimal>();
            merged.push(head);
        }
    }
    merged
}
