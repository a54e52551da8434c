//! Gateway contract consumed by the engine.
//!
//! Implementations normalize whatever the brokerage speaks into the types in
//! `broker::types`. Order-level refusals are returned as a rejected
//! [`OrderOutcome`]; only unreachable or garbled responses are errors.

use super::types::{FillRecord, OrderOutcome, PriceQuote};
use crate::error::EngineResult;
use crate::model::OrderKind;
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Current quote, `TransientNetwork` when unavailable.
    async fn get_price(&self, ticker: &str) -> EngineResult<PriceQuote>;

    async fn buy_order(
        &self,
        ticker: &str,
        quantity: Decimal,
        price: Decimal,
        kind: OrderKind,
    ) -> EngineResult<OrderOutcome>;

    async fn sell_order(
        &self,
        ticker: &str,
        quantity: Decimal,
        price: Decimal,
        kind: OrderKind,
    ) -> EngineResult<OrderOutcome>;

    /// Orders for `ticker` between the two local dates, inclusive.
    async fn get_transaction_history(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> EngineResult<Vec<FillRecord>>;
}
