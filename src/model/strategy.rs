//! Strategy definitions.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Raw named parameters as stored with the strategy.
pub type StrategyParams = serde_json::Map<String, Value>;

/// Closed set of supported strategy algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyVariant {
    /// Divided-investment averaging down with star-threshold exits.
    Averaging,
    /// Target-value rebalancing inside a price band.
    ValueRebalancing,
}

impl StrategyVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyVariant::Averaging => "AVERAGING",
            StrategyVariant::ValueRebalancing => "VALUE_REBALANCING",
        }
    }
}

impl fmt::Display for StrategyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StrategyVariant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AVERAGING" | "INFBUY" => Ok(StrategyVariant::Averaging),
            "VALUE_REBALANCING" | "VALUEREBALANCING" | "VR" => Ok(StrategyVariant::ValueRebalancing),
            other => Err(EngineError::InvalidParams(format!(
                "unknown strategy variant: {other}"
            ))),
        }
    }
}

/// Operator-controlled lifecycle of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyStatus {
    Active,
    Paused,
    Terminated,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Active => "ACTIVE",
            StrategyStatus::Paused => "PAUSED",
            StrategyStatus::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for StrategyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StrategyStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(StrategyStatus::Active),
            "PAUSED" => Ok(StrategyStatus::Paused),
            "TERMINATED" => Ok(StrategyStatus::Terminated),
            other => Err(EngineError::InvalidParams(format!(
                "unknown strategy status: {other}"
            ))),
        }
    }
}

/// A persisted strategy.
#[derive(Debug, Clone)]
pub struct Strategy {
    pub id: i64,
    pub name: String,
    /// Brokerage account reference (e.g. "64827830-01")
    pub account: String,
    pub variant: StrategyVariant,
    pub status: StrategyStatus,
    pub params: StrategyParams,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Strategy {
    /// The traded symbol, required for every variant.
    pub fn ticker(&self) -> EngineResult<&str> {
        self.params
            .get("ticker")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                EngineError::InvalidParams(format!("strategy {} has no ticker", self.name))
            })
    }

    pub fn is_active(&self) -> bool {
        self.status == StrategyStatus::Active
    }
}

/// Input for creating a strategy.
#[derive(Debug, Clone)]
pub struct NewStrategy {
    pub name: String,
    pub account: String,
    pub variant: StrategyVariant,
    pub params: StrategyParams,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strategy_with(params: Value) -> Strategy {
        Strategy {
            id: 1,
            name: "tqqq-avg".to_string(),
            account: "12345678-01".to_string(),
            variant: StrategyVariant::Averaging,
            status: StrategyStatus::Active,
            params: params.as_object().cloned().unwrap_or_default(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_variant_parsing_accepts_legacy_codes() {
        assert_eq!("InfBuy".parse::<StrategyVariant>().unwrap(), StrategyVariant::Averaging);
        assert_eq!("VR".parse::<StrategyVariant>().unwrap(), StrategyVariant::ValueRebalancing);
        assert_eq!(
            "value_rebalancing".parse::<StrategyVariant>().unwrap(),
            StrategyVariant::ValueRebalancing
        );
        assert!("grid".parse::<StrategyVariant>().is_err());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [StrategyStatus::Active, StrategyStatus::Paused, StrategyStatus::Terminated] {
            assert_eq!(status.as_str().parse::<StrategyStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_ticker_required() {
        assert_eq!(strategy_with(json!({"ticker": "TQQQ"})).ticker().unwrap(), "TQQQ");
        assert!(strategy_with(json!({"division": 20})).ticker().is_err());
        assert!(strategy_with(json!({"ticker": "  "})).ticker().is_err());
    }
}
