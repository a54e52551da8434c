//! Typed progress state carried by each snapshot.

use crate::model::StrategyVariant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Schema version written alongside every persisted progress state.
pub const PROGRESS_VERSION: u32 = 1;

/// Averaging position state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AveragingState {
    /// Progress ratio: position cost divided by one investment unit
    pub t: Decimal,
    /// Dynamic gain threshold (rate)
    pub star: Decimal,
    pub investment: Decimal,
    pub unit_investment: Decimal,
    pub quantity: Decimal,
    pub avg_price: Decimal,
    /// Cash balance
    pub balance: Decimal,
    pub equity: Decimal,
    /// Realized profit of the last closed round
    #[serde(default)]
    pub daily_profit: Decimal,
}

/// Value-rebalancing position state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRebalancingState {
    /// Target portfolio value
    pub v: Decimal,
    pub quantity: Decimal,
    /// Cash reserve available for trades
    pub pool: Decimal,
    pub avg_price: Decimal,
    pub equity: Decimal,
    pub total_investment: Decimal,
    /// Realized profit of the last closed period
    #[serde(default)]
    pub cycle_profit: Decimal,
}

/// Progress state, one shape per strategy variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ProgressState {
    Averaging(AveragingState),
    ValueRebalancing(ValueRebalancingState),
}

impl ProgressState {
    pub fn variant(&self) -> StrategyVariant {
        match self {
            ProgressState::Averaging(_) => StrategyVariant::Averaging,
            ProgressState::ValueRebalancing(_) => StrategyVariant::ValueRebalancing,
        }
    }

    /// Shares currently held.
    pub fn quantity(&self) -> Decimal {
        match self {
            ProgressState::Averaging(s) => s.quantity,
            ProgressState::ValueRebalancing(s) => s.quantity,
        }
    }

    pub fn equity(&self) -> Decimal {
        match self {
            ProgressState::Averaging(s) => s.equity,
            ProgressState::ValueRebalancing(s) => s.equity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_progress_json_is_tagged() {
        let state = ProgressState::ValueRebalancing(ValueRebalancingState {
            v: dec!(10000),
            quantity: Decimal::ZERO,
            pool: dec!(10000),
            avg_price: Decimal::ZERO,
            equity: dec!(10000),
            total_investment: dec!(10000),
            cycle_profit: Decimal::ZERO,
        });

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["variant"], "value_rebalancing");

        let back: ProgressState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.variant(), StrategyVariant::ValueRebalancing);
    }
}
