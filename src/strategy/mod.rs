//! Strategy algorithms.
//!
//! Each variant supplies the same capabilities:
//! - order generation from the current progress state and price
//! - next-state calculation from a closed round's fills
//! - a human-readable summary
//!
//! [`StrategyKind`] dispatches to the variant selected on the strategy.

mod averaging;
mod executor;
mod summary;
mod value_rebalancing;

pub use averaging::{AveragingParams, AveragingStrategy};
pub use executor::{OrderExecutor, PlacementReport};
pub use summary::{OrderStats, SideStats, StrategySummary};
pub use value_rebalancing::{merge_orders, ValueRebalancingParams, ValueRebalancingStrategy};

use crate::error::{EngineError, EngineResult};
use crate::model::{
    FillSummary, OrderIntent, OrderRecord, ProgressState, Snapshot, Strategy, StrategyParams,
    StrategyVariant,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;

/// When an open snapshot may be closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundBoundary {
    /// As soon as every order is finalized
    OrdersFinalized,
    /// Every order finalized and at least this many local days since creation
    PeriodElapsed { days: u32 },
}

/// A strategy's algorithm with its parsed parameters.
#[derive(Debug, Clone)]
pub enum StrategyKind {
    Averaging(AveragingStrategy),
    ValueRebalancing(ValueRebalancingStrategy),
}

fn parse_params<T: DeserializeOwned>(name: &str, params: &StrategyParams) -> EngineResult<T> {
    serde_json::from_value(serde_json::Value::Object(params.clone()))
        .map_err(|e| EngineError::InvalidParams(format!("strategy {name}: {e}")))
}

impl StrategyKind {
    pub fn from_strategy(strategy: &Strategy) -> EngineResult<Self> {
        match strategy.variant {
            StrategyVariant::Averaging => Ok(Self::Averaging(AveragingStrategy::new(
                parse_params(&strategy.name, &strategy.params)?,
            )?)),
            StrategyVariant::ValueRebalancing => Ok(Self::ValueRebalancing(
                ValueRebalancingStrategy::new(parse_params(&strategy.name, &strategy.params)?)?,
            )),
        }
    }

    pub fn variant(&self) -> StrategyVariant {
        match self {
            Self::Averaging(_) => StrategyVariant::Averaging,
            Self::ValueRebalancing(_) => StrategyVariant::ValueRebalancing,
        }
    }

    pub fn ticker(&self) -> &str {
        match self {
            Self::Averaging(s) => &s.params().ticker,
            Self::ValueRebalancing(s) => &s.params().ticker,
        }
    }

    pub fn boundary(&self) -> RoundBoundary {
        match self {
            Self::Averaging(_) => RoundBoundary::OrdersFinalized,
            Self::ValueRebalancing(s) => RoundBoundary::PeriodElapsed {
                days: s.period_days(),
            },
        }
    }

    /// Whether a new order round may start inside an open snapshot once its
    /// orders are finalized.
    pub fn trades_within_round(&self) -> bool {
        matches!(self, Self::ValueRebalancing(_))
    }

    pub fn initial_state(&self) -> ProgressState {
        match self {
            Self::Averaging(s) => ProgressState::Averaging(s.initial_state()),
            Self::ValueRebalancing(s) => ProgressState::ValueRebalancing(s.initial_state()),
        }
    }

    fn mismatch(&self, progress: &ProgressState) -> EngineError {
        EngineError::InvalidState(format!(
            "{} strategy cannot use {} progress state",
            self.variant(),
            progress.variant()
        ))
    }

    pub fn generate_orders(
        &self,
        progress: &ProgressState,
        current_price: Decimal,
    ) -> EngineResult<Vec<OrderIntent>> {
        match (self, progress) {
            (Self::Averaging(s), ProgressState::Averaging(state)) => {
                s.generate_orders(state, current_price)
            }
            (Self::ValueRebalancing(s), ProgressState::ValueRebalancing(state)) => {
                s.generate_orders(state, current_price)
            }
            _ => Err(self.mismatch(progress)),
        }
    }

    /// Progress state and cycle number of the round following a closed one.
    pub fn next_state(
        &self,
        progress: &ProgressState,
        cycle: u32,
        fills: &FillSummary,
        current_price: Decimal,
    ) -> EngineResult<(ProgressState, u32)> {
        match (self, progress) {
            (Self::Averaging(s), ProgressState::Averaging(state)) => {
                let (next, cycle) = s.next_state(state, cycle, fills, current_price);
                Ok((ProgressState::Averaging(next), cycle))
            }
            (Self::ValueRebalancing(s), ProgressState::ValueRebalancing(state)) => {
                let next = s.next_state(state, fills, current_price)?;
                Ok((ProgressState::ValueRebalancing(next), cycle + 1))
            }
            _ => Err(self.mismatch(progress)),
        }
    }

    /// State to trade from while a round is still open.
    pub fn working_state(
        &self,
        progress: &ProgressState,
        fills: &FillSummary,
        current_price: Decimal,
    ) -> EngineResult<ProgressState> {
        match (self, progress) {
            (Self::Averaging(_), ProgressState::Averaging(_)) => Ok(progress.clone()),
            (Self::ValueRebalancing(s), ProgressState::ValueRebalancing(state)) => Ok(
                ProgressState::ValueRebalancing(s.interim_state(state, fills, current_price)),
            ),
            _ => Err(self.mismatch(progress)),
        }
    }

    pub fn summarize(
        &self,
        strategy: &Strategy,
        snapshot: &Snapshot,
        latest_orders: &[OrderRecord],
        cycle_orders: &[OrderRecord],
    ) -> StrategySummary {
        let state = match (&snapshot.progress, self) {
            (ProgressState::Averaging(s), _) => vec![
                ("T", s.t.to_string()),
                ("star", format!("{}%", (s.star * Decimal::ONE_HUNDRED).normalize())),
                ("quantity", s.quantity.normalize().to_string()),
                ("avg price", s.avg_price.to_string()),
                ("investment", s.investment.to_string()),
                ("unit", s.unit_investment.round_dp(2).to_string()),
                ("balance", s.balance.to_string()),
                ("equity", s.equity.round_dp(2).to_string()),
                ("realized", s.daily_profit.round_dp(2).to_string()),
            ],
            (ProgressState::ValueRebalancing(s), Self::ValueRebalancing(vr)) => {
                let params = vr.params();
                let upper = s.v * (Decimal::ONE + params.u_band / Decimal::ONE_HUNDRED);
                let lower = s.v * (Decimal::ONE - params.l_band / Decimal::ONE_HUNDRED);
                vec![
                    ("V", s.v.to_string()),
                    ("band", format!("{} - {}", lower.round_dp(2), upper.round_dp(2))),
                    ("quantity", s.quantity.normalize().to_string()),
                    ("pool", s.pool.to_string()),
                    ("avg price", s.avg_price.to_string()),
                    ("equity", s.equity.to_string()),
                    ("invested", s.total_investment.to_string()),
                    ("realized", s.cycle_profit.round_dp(2).to_string()),
                ]
            }
            (ProgressState::ValueRebalancing(s), _) => vec![
                ("V", s.v.to_string()),
                ("quantity", s.quantity.normalize().to_string()),
                ("pool", s.pool.to_string()),
            ],
        };

        StrategySummary::new(
            strategy,
            self.ticker(),
            snapshot,
            state,
            latest_orders,
            cycle_orders,
        )
    }
}
