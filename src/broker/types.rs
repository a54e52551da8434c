//! Broker-agnostic request and response types.

use crate::error::EngineError;
use crate::model::OrderStatus;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current quote for a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Last traded price
    pub price: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub open: Decimal,
    /// Previous close
    pub base: Decimal,
}

impl PriceQuote {
    /// Quote where every field equals `price`.
    pub fn flat(price: Decimal) -> Self {
        Self {
            price,
            high: price,
            low: price,
            open: price,
            base: price,
        }
    }
}

/// Normalized result of one order submission.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrderOutcome {
    pub accepted: bool,
    pub order_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    /// Rejected because the market is closed (holiday or after-hours)
    pub is_market_closed: bool,
}

impl OrderOutcome {
    pub fn accepted(order_id: impl Into<String>) -> Self {
        Self {
            accepted: true,
            order_id: Some(order_id.into()),
            ..Default::default()
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn market_closed(message: impl Into<String>) -> Self {
        Self {
            is_market_closed: true,
            ..Self::rejected("MARKET_CLOSED", message)
        }
    }

    /// Rejection as an engine error; `None` when accepted.
    pub fn rejection(&self) -> Option<EngineError> {
        if self.accepted {
            return None;
        }
        let message = self
            .error_message
            .clone()
            .unwrap_or_else(|| "no reason given".to_string());
        if self.is_market_closed {
            Some(EngineError::MarketClosed(message))
        } else {
            Some(EngineError::BrokerRejection {
                code: self.error_code.clone().unwrap_or_default(),
                message,
            })
        }
    }
}

/// One entry of the broker's transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct FillRecord {
    pub order_id: String,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
    /// Total traded value (quantity x price)
    pub filled_amount: Decimal,
}

impl FillRecord {
    /// Average fill price, zero when nothing filled.
    pub fn filled_price(&self) -> Decimal {
        if self.filled_quantity > Decimal::ZERO {
            self.filled_amount / self.filled_quantity
        } else {
            Decimal::ZERO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rejection_classification() {
        assert!(OrderOutcome::accepted("1").rejection().is_none());
        assert!(matches!(
            OrderOutcome::market_closed("holiday").rejection(),
            Some(EngineError::MarketClosed(_))
        ));
        assert!(matches!(
            OrderOutcome::rejected("40310000", "insufficient cash").rejection(),
            Some(EngineError::BrokerRejection { .. })
        ));
    }

    #[test]
    fn test_fill_price() {
        let record = FillRecord {
            order_id: "1".into(),
            status: OrderStatus::Filled,
            filled_quantity: dec!(4),
            filled_amount: dec!(410),
        };
        assert_eq!(record.filled_price(), dec!(102.5));

        let empty = FillRecord {
            filled_quantity: Decimal::ZERO,
            filled_amount: Decimal::ZERO,
            status: OrderStatus::Unfilled,
            ..record
        };
        assert_eq!(empty.filled_price(), Decimal::ZERO);
    }
}
