//! Order reconciliation against broker transaction history.

use super::clock::{Clock, TradingCalendar};
use crate::broker::{BrokerGateway, FillRecord};
use crate::error::EngineResult;
use crate::model::{OrderRecord, OrderStatus, Snapshot};
use crate::persistence::StrategyRepository;
use chrono::Duration;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Orders whose status or fill changed
    pub updated: usize,
    /// Submitted orders the broker history did not mention
    pub gaps: usize,
    /// No order is SUBMITTED any more
    pub all_finalized: bool,
}

/// Updates a snapshot's orders from the broker's history.
pub struct OrderReconciler {
    calendar: TradingCalendar,
    /// Days subtracted from the snapshot's creation date when querying history
    history_offset_days: u32,
}

impl OrderReconciler {
    pub fn new(calendar: TradingCalendar, history_offset_days: u32) -> Self {
        Self {
            calendar,
            history_offset_days,
        }
    }

    /// Refresh the snapshot's orders and persist the changes before reporting.
    pub async fn reconcile(
        &self,
        broker: &dyn BrokerGateway,
        repo: &dyn StrategyRepository,
        clock: &dyn Clock,
        ticker: &str,
        snapshot: &Snapshot,
    ) -> EngineResult<ReconcileReport> {
        let snapshot_id = snapshot.require_id()?;
        let mut orders = repo.list_orders(snapshot_id)?;

        if orders.iter().all(|o| o.status.is_finalized()) {
            debug!(snapshot_id, orders = orders.len(), "Nothing to reconcile");
            return Ok(ReconcileReport {
                all_finalized: true,
                ..Default::default()
            });
        }

        let (start, end) = self.history_window(snapshot, &orders);
        let history = broker.get_transaction_history(ticker, start, end).await?;
        let by_order_id: HashMap<&str, &FillRecord> =
            history.iter().map(|h| (h.order_id.as_str(), h)).collect();

        let now = clock.now();
        let mut report = ReconcileReport::default();
        let mut changed = Vec::new();

        for order in orders.iter_mut() {
            let Some(broker_id) = order.broker_order_id.as_deref() else {
                continue;
            };
            match by_order_id.get(broker_id) {
                Some(record) => {
                    if apply_fill(order, record) {
                        order.updated_at = now;
                        report.updated += 1;
                        changed.push(order.clone());
                    }
                }
                None if order.status == OrderStatus::Submitted => {
                    info!(
                        snapshot_id,
                        order_id = %broker_id,
                        %start,
                        %end,
                        "Order not found in broker history yet"
                    );
                    report.gaps += 1;
                }
                None => {}
            }
        }

        if !changed.is_empty() {
            repo.save_orders(&mut changed)?;
        }

        report.all_finalized = orders.iter().all(|o| o.status.is_finalized());
        info!(
            snapshot_id,
            %ticker,
            history = history.len(),
            updated = report.updated,
            gaps = report.gaps,
            all_finalized = report.all_finalized,
            "Orders reconciled"
        );
        Ok(report)
    }

    /// Local dates from the snapshot's creation (less the offset) or the
    /// earliest order update, whichever is earlier, to the latest order update.
    fn history_window(
        &self,
        snapshot: &Snapshot,
        orders: &[OrderRecord],
    ) -> (chrono::NaiveDate, chrono::NaiveDate) {
        let created = self.calendar.local_date(snapshot.created_at)
            - Duration::days(i64::from(self.history_offset_days));
        let updated = orders.iter().map(|o| self.calendar.local_date(o.updated_at));
        let first = updated.clone().min().map_or(created, |d| d.min(created));
        let last = updated.max().map_or(created, |d| d.max(first));
        (first, last)
    }
}

/// Copy a history record onto the order; true when anything changed.
fn apply_fill(order: &mut OrderRecord, record: &FillRecord) -> bool {
    let filled_price = record.filled_price();
    let changed = order.status != record.status
        || order.filled_quantity != record.filled_quantity
        || order.filled_price != filled_price;

    order.status = record.status;
    order.filled_quantity = record.filled_quantity;
    order.filled_price = filled_price;
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerGateway;
    use crate::engine::ManualClock;
    use crate::model::{
        NewStrategy, OrderKind, OrderSide, OrderTag, ProgressState, SnapshotStatus,
        StrategyVariant, ValueRebalancingState,
    };
    use crate::persistence::SqliteRepository;
    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct Fixture {
        repo: SqliteRepository,
        clock: ManualClock,
        snapshot: Snapshot,
    }

    fn fixture(broker_ids: &[Option<&str>]) -> Fixture {
        // 2024-03-04 15:00 KST
        let created = Utc.with_ymd_and_hms(2024, 3, 4, 6, 0, 0).unwrap();
        let repo = SqliteRepository::new(":memory:").unwrap();
        let strategy = repo
            .create_strategy(
                &NewStrategy {
                    name: "vr".to_string(),
                    account: "1".to_string(),
                    variant: StrategyVariant::ValueRebalancing,
                    params: serde_json::Map::new(),
                    description: None,
                },
                created,
            )
            .unwrap();
        let progress = ProgressState::ValueRebalancing(ValueRebalancingState {
            v: dec!(10000),
            quantity: Decimal::ZERO,
            pool: dec!(10000),
            avg_price: Decimal::ZERO,
            equity: dec!(10000),
            total_investment: dec!(10000),
            cycle_profit: Decimal::ZERO,
        });
        let mut snapshot =
            Snapshot::new(strategy.id, 1, 1, SnapshotStatus::InProgress, progress, created);
        repo.save_snapshot(&mut snapshot).unwrap();

        let mut orders: Vec<OrderRecord> = broker_ids
            .iter()
            .map(|id| OrderRecord {
                id: None,
                snapshot_id: snapshot.id.unwrap(),
                broker_order_id: id.map(str::to_string),
                symbol: "QLD".to_string(),
                side: OrderSide::Buy,
                kind: OrderKind::Loc,
                tag: OrderTag::VrBuy,
                status: if id.is_some() { OrderStatus::Submitted } else { OrderStatus::Rejected },
                quantity: dec!(2),
                price: dec!(50),
                filled_quantity: Decimal::ZERO,
                filled_price: Decimal::ZERO,
                error_message: None,
                ordered_at: created,
                updated_at: created,
            })
            .collect();
        repo.save_orders(&mut orders).unwrap();

        Fixture {
            repo,
            clock: ManualClock::new(created + Duration::hours(20)),
            snapshot,
        }
    }

    fn reconciler() -> OrderReconciler {
        OrderReconciler::new(TradingCalendar::from_offset_hours(9), 1)
    }

    #[tokio::test]
    async fn test_fills_applied_and_gaps_left_alone() {
        let fx = fixture(&[Some("A"), Some("B"), None]);
        let mut broker = MockBrokerGateway::new();
        broker
            .expect_get_transaction_history()
            .withf(|_, start, end| {
                *start == NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()
                    && *end == NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![FillRecord {
                    order_id: "A".to_string(),
                    status: OrderStatus::PartiallyFilled,
                    filled_quantity: dec!(1),
                    filled_amount: dec!(49.5),
                }])
            });

        let report = reconciler()
            .reconcile(&broker, &fx.repo, &fx.clock, "QLD", &fx.snapshot)
            .await
            .unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.gaps, 1);
        assert!(!report.all_finalized);

        let orders = fx.repo.list_orders(fx.snapshot.id.unwrap()).unwrap();
        assert_eq!(orders[0].status, OrderStatus::PartiallyFilled);
        assert_eq!(orders[0].filled_price, dec!(49.5));
        assert_eq!(orders[1].status, OrderStatus::Submitted);
        assert_eq!(orders[1].filled_quantity, Decimal::ZERO);
        assert_eq!(orders[2].status, OrderStatus::Rejected);
    }

    #[tokio::test]
    async fn test_all_finalized_after_history_covers_everything() {
        let fx = fixture(&[Some("A"), Some("B")]);
        let mut broker = MockBrokerGateway::new();
        broker.expect_get_transaction_history().returning(|_, _, _| {
            Ok(vec![
                FillRecord {
                    order_id: "A".to_string(),
                    status: OrderStatus::Filled,
                    filled_quantity: dec!(2),
                    filled_amount: dec!(100),
                },
                FillRecord {
                    order_id: "B".to_string(),
                    status: OrderStatus::Unfilled,
                    filled_quantity: Decimal::ZERO,
                    filled_amount: Decimal::ZERO,
                },
            ])
        });

        let reconciler = reconciler();
        let report = reconciler
            .reconcile(&broker, &fx.repo, &fx.clock, "QLD", &fx.snapshot)
            .await
            .unwrap();
        assert!(report.all_finalized);
        assert_eq!(report.updated, 2);

        // everything final: the broker is not asked again
        let idle = MockBrokerGateway::new();
        let again = reconciler
            .reconcile(&idle, &fx.repo, &fx.clock, "QLD", &fx.snapshot)
            .await
            .unwrap();
        assert!(again.all_finalized);
        assert_eq!(again.updated, 0);
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_finalized() {
        let fx = fixture(&[]);
        let broker = MockBrokerGateway::new();
        let report = reconciler()
            .reconcile(&broker, &fx.repo, &fx.clock, "QLD", &fx.snapshot)
            .await
            .unwrap();
        assert!(report.all_finalized);
    }

    #[tokio::test]
    async fn test_history_errors_propagate() {
        let fx = fixture(&[Some("A")]);
        let mut broker = MockBrokerGateway::new();
        broker
            .expect_get_transaction_history()
            .returning(|_, _, _| Err(crate::error::EngineError::TransientNetwork("502".into())));

        let err = reconciler()
            .reconcile(&broker, &fx.repo, &fx.clock, "QLD", &fx.snapshot)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        let orders = fx.repo.list_orders(fx.snapshot.id.unwrap()).unwrap();
        assert_eq!(orders[0].status, OrderStatus::Submitted);
    }
}
