//! Snapshot lifecycle transitions.
//!
//! ```text
//! INIT ──► COMPLETED ──► PENDING ──► IN_PROGRESS ──► COMPLETED ──► PENDING ...
//!                           │             │
//!                           └─────────────┴──► FAILED (terminal)
//! ```
//!
//! The machine only decides; persistence is left to the runner.

use super::clock::TradingCalendar;
use crate::error::EngineResult;
use crate::model::{FillSummary, OrderRecord, Snapshot, SnapshotStatus};
use crate::strategy::{PlacementReport, RoundBoundary, StrategyKind};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// What a placement attempt did to the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementVerdict {
    /// Round is working at the broker (or had nothing to place)
    Started,
    /// Nothing accepted, retry on the next tick
    Deferred,
    /// Every order was rejected
    Failed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct SnapshotStateMachine {
    calendar: TradingCalendar,
}

impl SnapshotStateMachine {
    pub fn new(calendar: TradingCalendar) -> Self {
        Self { calendar }
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    /// Synthetic cycle 0 snapshot holding the strategy's starting state.
    pub fn initial_snapshot(
        &self,
        strategy_id: i64,
        kind: &StrategyKind,
        now: DateTime<Utc>,
    ) -> Snapshot {
        Snapshot::new(
            strategy_id,
            0,
            0,
            SnapshotStatus::Init,
            kind.initial_state(),
            now,
        )
    }

    /// Whether an IN_PROGRESS snapshot may be closed.
    pub fn boundary_reached(
        &self,
        boundary: RoundBoundary,
        all_finalized: bool,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
    ) -> bool {
        if snapshot.status != SnapshotStatus::InProgress || !all_finalized {
            return false;
        }
        match boundary {
            RoundBoundary::OrdersFinalized => true,
            RoundBoundary::PeriodElapsed { days } => {
                self.calendar.has_elapsed(snapshot.created_at, now, days)
            }
        }
    }

    /// Close `closing` and build the PENDING snapshot that follows it.
    ///
    /// An INIT snapshot hands its state over unchanged as cycle 1; any other
    /// snapshot goes through the strategy's next-state calculation.
    pub fn successor(
        &self,
        kind: &StrategyKind,
        closing: &mut Snapshot,
        orders: &[OrderRecord],
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> EngineResult<Snapshot> {
        let (progress, cycle) = if closing.status == SnapshotStatus::Init {
            (closing.progress.clone(), 1)
        } else {
            let fills = FillSummary::from_orders(orders);
            kind.next_state(&closing.progress, closing.cycle, &fills, current_price)?
        };

        closing.status = SnapshotStatus::Completed;
        closing.updated_at = now;

        Ok(Snapshot::new(
            closing.strategy_id,
            cycle,
            closing.step + 1,
            SnapshotStatus::Pending,
            progress,
            now,
        ))
    }

    /// Apply the result of submitting a round to its snapshot.
    pub fn apply_placement(
        &self,
        snapshot: &mut Snapshot,
        report: &PlacementReport,
        now: DateTime<Utc>,
    ) -> PlacementVerdict {
        snapshot.updated_at = now;

        if report.is_success() {
            if report.accepted > 0 {
                snapshot.executed_at = Some(now);
            } else if snapshot.status == SnapshotStatus::Pending {
                snapshot.executed_at = None;
            }
            snapshot.status = SnapshotStatus::InProgress;
            snapshot.last_error = None;
            return PlacementVerdict::Started;
        }

        if report.market_closed {
            if snapshot.status == SnapshotStatus::Pending {
                snapshot.executed_at = None;
            }
            snapshot.last_error = report.last_error.clone();
            return PlacementVerdict::Deferred;
        }

        if report.rejected > 0 {
            let reason = report
                .last_error
                .clone()
                .unwrap_or_else(|| "all orders rejected".to_string());
            snapshot.fail(reason.clone(), now);
            return PlacementVerdict::Failed(reason);
        }

        snapshot.last_error = report.last_error.clone();
        PlacementVerdict::Deferred
    }
}
