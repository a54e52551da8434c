//! Order submission for one round.

use crate::broker::{BrokerGateway, OrderOutcome};
use crate::engine::Clock;
use crate::error::{EngineError, EngineResult};
use crate::model::{OrderIntent, OrderRecord, OrderSide, OrderStatus};
use crate::persistence::StrategyRepository;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{error, info, warn};

/// Submits generated orders one by one and records every attempt.
pub struct OrderExecutor {
    pacing: Duration,
}

/// What happened to a batch of orders.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PlacementReport {
    /// Orders handed to the executor
    pub generated: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Orders that never got an answer from the broker
    pub transient_failures: usize,
    /// Broker answers whose audit row could not be saved
    pub unrecorded: usize,
    /// Placement stopped because the market is closed
    pub market_closed: bool,
    pub last_error: Option<String>,
}

impl PlacementReport {
    /// Any order accepted, or nothing to place.
    pub fn is_success(&self) -> bool {
        self.accepted > 0 || self.generated == 0
    }
}

impl OrderExecutor {
    /// `pacing` is the delay between consecutive submissions.
    pub fn new(pacing: Duration) -> Self {
        Self { pacing }
    }

    /// Submit `intents` for `ticker`, saving a row for every broker answer.
    ///
    /// Rejections and transport errors are counted and the next order is tried;
    /// a market-closed rejection stops the batch. A row that fails to save is
    /// logged and counted, the broker's answer still counts.
    pub async fn place_orders(
        &self,
        broker: &dyn BrokerGateway,
        repo: &dyn StrategyRepository,
        clock: &dyn Clock,
        ticker: &str,
        snapshot_id: i64,
        intents: &[OrderIntent],
    ) -> EngineResult<PlacementReport> {
        let mut report = PlacementReport {
            generated: intents.len(),
            ..Default::default()
        };

        for (index, intent) in intents.iter().enumerate() {
            if intent.quantity <= Decimal::ZERO {
                continue;
            }
            if index > 0 && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let result = match intent.side {
                OrderSide::Buy => {
                    broker
                        .buy_order(ticker, intent.quantity, intent.price, intent.kind)
                        .await
                }
                OrderSide::Sell => {
                    broker
                        .sell_order(ticker, intent.quantity, intent.price, intent.kind)
                        .await
                }
            };

            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        %ticker,
                        side = %intent.side,
                        tag = %intent.tag,
                        error = %e,
                        "Order submission failed, continuing with next order"
                    );
                    report.transient_failures += 1;
                    report.last_error = Some(e.to_string());
                    continue;
                }
            };

            let mut record = self.record(ticker, snapshot_id, intent, &outcome, clock);
            if let Err(e) = repo.save_order(&mut record) {
                error!(
                    %ticker,
                    snapshot_id,
                    order_id = ?outcome.order_id,
                    side = %intent.side,
                    tag = %intent.tag,
                    error = %format!("{e:#}"),
                    "Failed to record order, broker answer kept"
                );
                report.unrecorded += 1;
            }

            match outcome.rejection() {
                None => {
                    report.accepted += 1;
                    info!(
                        %ticker,
                        order_id = ?outcome.order_id,
                        side = %intent.side,
                        tag = %intent.tag,
                        kind = %intent.kind,
                        quantity = %intent.quantity,
                        price = %intent.price,
                        "Order accepted"
                    );
                }
                Some(EngineError::MarketClosed(message)) => {
                    info!(%ticker, %message, "Market closed, stopping order placement");
                    report.market_closed = true;
                    report.last_error = record.error_message;
                    break;
                }
                Some(rejection) => {
                    warn!(
                        %ticker,
                        side = %intent.side,
                        tag = %intent.tag,
                        error = %rejection,
                        "Order rejected"
                    );
                    report.rejected += 1;
                    report.last_error = record.error_message;
                }
            }
        }

        info!(
            %ticker,
            snapshot_id,
            generated = report.generated,
            accepted = report.accepted,
            rejected = report.rejected,
            transient_failures = report.transient_failures,
            unrecorded = report.unrecorded,
            market_closed = report.market_closed,
            "Order placement finished"
        );
        Ok(report)
    }

    fn record(
        &self,
        ticker: &str,
        snapshot_id: i64,
        intent: &OrderIntent,
        outcome: &OrderOutcome,
        clock: &dyn Clock,
    ) -> OrderRecord {
        let now = clock.now();
        let (status, error_message) = if outcome.accepted {
            (OrderStatus::Submitted, None)
        } else {
            let message = format!(
                "{} - {}",
                outcome.error_code.as_deref().unwrap_or(""),
                outcome.error_message.as_deref().unwrap_or("Unknown error")
            );
            (OrderStatus::Rejected, Some(message))
        };

        OrderRecord {
            id: None,
            snapshot_id,
            broker_order_id: outcome.order_id.clone().filter(|_| outcome.accepted),
            symbol: ticker.to_string(),
            side: intent.side,
            kind: intent.kind,
            tag: intent.tag,
            status,
            quantity: intent.quantity,
            price: intent.price,
            filled_quantity: Decimal::ZERO,
            filled_price: Decimal::ZERO,
            error_message,
            ordered_at: now,
            updated_at: now,
        }
    }
}
