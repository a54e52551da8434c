//! Orders submitted on behalf of a snapshot.

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order status as tracked locally and reported by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Submitted,
    Filled,
    PartiallyFilled,
    Unfilled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Anything but SUBMITTED is final for reconciliation purposes.
    pub fn is_finalized(&self) -> bool {
        *self != OrderStatus::Submitted
    }

    /// Whether fills of this order count toward the position.
    pub fn has_fill(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::PartiallyFilled)
    }
}

/// Broker order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    Limit,
    /// Limit-on-close
    Loc,
    /// Market-on-close, price is ignored
    Moc,
}

/// Why an order was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderTag {
    Init,
    InitDrop,
    AvgBuy,
    StarBuy,
    StarSell,
    AllSell,
    QtrSell,
    VrBuy,
    VrSell,
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(EngineError::InvalidState(format!(
                        concat!("unknown ", stringify!($ty), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(OrderSide { Buy => "BUY", Sell => "SELL" });

text_enum!(OrderStatus {
    Submitted => "SUBMITTED",
    Filled => "FILLED",
    PartiallyFilled => "PARTIALLY_FILLED",
    Unfilled => "UNFILLED",
    Cancelled => "CANCELLED",
    Rejected => "REJECTED",
});

text_enum!(OrderKind { Limit => "LIMIT", Loc => "LOC", Moc => "MOC" });

text_enum!(OrderTag {
    Init => "Init",
    InitDrop => "InitDrop",
    AvgBuy => "AvgBuy",
    StarBuy => "StarBuy",
    StarSell => "StarSell",
    AllSell => "AllSell",
    QtrSell => "QtrSell",
    VrBuy => "VrBuy",
    VrSell => "VrSell",
});

/// An order generated by a strategy, before submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderIntent {
    pub side: OrderSide,
    pub kind: OrderKind,
    pub tag: OrderTag,
    pub quantity: Decimal,
    pub price: Decimal,
}

impl OrderIntent {
    pub fn loc(side: OrderSide, tag: OrderTag, price: Decimal, quantity: Decimal) -> Self {
        Self {
            side,
            kind: OrderKind::Loc,
            tag,
            quantity,
            price,
        }
    }
}

/// One submission attempt, persisted under its snapshot.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: Option<i64>,
    pub snapshot_id: i64,
    /// Broker-assigned id; absent when the broker rejected the order
    pub broker_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub tag: OrderTag,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub price: Decimal,
    pub filled_quantity: Decimal,
    pub filled_price: Decimal,
    pub error_message: Option<String>,
    pub ordered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    pub fn filled_value(&self) -> Decimal {
        self.filled_quantity * self.filled_price
    }
}

/// Filled quantity and value on one side.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillTotals {
    pub quantity: Decimal,
    pub value: Decimal,
}

impl FillTotals {
    fn add(&mut self, quantity: Decimal, value: Decimal) {
        self.quantity += quantity;
        self.value += value;
    }
}

/// Aggregated fills of a set of orders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FillSummary {
    pub buy: FillTotals,
    pub sell: FillTotals,
}

impl FillSummary {
    /// Sum the FILLED and PARTIALLY_FILLED orders.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a OrderRecord>) -> Self {
        let mut summary = Self::default();
        for order in orders.into_iter().filter(|o| o.status.has_fill()) {
            let totals = match order.side {
                OrderSide::Buy => &mut summary.buy,
                OrderSide::Sell => &mut summary.sell,
            };
            totals.add(order.filled_quantity, order.filled_value());
        }
        summary
    }

    /// Profit realized by the sells against the given cost basis.
    pub fn realized_profit(&self, cost_basis: Decimal) -> Decimal {
        self.sell.value - self.sell.quantity * cost_basis
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn filled(side: OrderSide, quantity: Decimal, price: Decimal) -> OrderRecord {
        let now = Utc::now();
        OrderRecord {
            id: None,
            snapshot_id: 1,
            broker_order_id: Some(format!("B-{side}-{quantity}-{price}")),
            symbol: "TQQQ".to_string(),
            side,
            kind: OrderKind::Loc,
            tag: OrderTag::StarBuy,
            status: OrderStatus::Filled,
            quantity,
            price,
            filled_quantity: quantity,
            filled_price: price,
            error_message: None,
            ordered_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_fill_summary_ignores_unfilled() {
        let mut unfilled = filled(OrderSide::Buy, dec!(3), dec!(50));
        unfilled.status = OrderStatus::Unfilled;
        let mut partial = filled(OrderSide::Sell, dec!(4), dec!(60));
        partial.status = OrderStatus::PartiallyFilled;
        partial.filled_quantity = dec!(2);

        let orders = vec![filled(OrderSide::Buy, dec!(5), dec!(40)), unfilled, partial];
        let summary = FillSummary::from_orders(&orders);

        assert_eq!(summary.buy.quantity, dec!(5));
        assert_eq!(summary.buy.value, dec!(200));
        assert_eq!(summary.sell.quantity, dec!(2));
        assert_eq!(summary.sell.value, dec!(120));
        assert_eq!(summary.realized_profit(dec!(45)), dec!(30));
    }

    #[test]
    fn test_text_enums() {
        assert_eq!("PARTIALLY_FILLED".parse::<OrderStatus>().unwrap(), OrderStatus::PartiallyFilled);
        assert_eq!(OrderKind::Moc.to_string(), "MOC");
        assert_eq!("QtrSell".parse::<OrderTag>().unwrap(), OrderTag::QtrSell);
        assert!("HOLD".parse::<OrderSide>().is_err());
        assert!(!OrderStatus::Submitted.is_finalized());
        assert!(OrderStatus::Unfilled.is_finalized());
    }
}
