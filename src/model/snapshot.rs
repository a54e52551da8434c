//! Strategy snapshots.

use crate::error::{EngineError, EngineResult};
use crate::model::ProgressState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Snapshot lifecycle.
///
/// INIT -> COMPLETED -> PENDING -> IN_PROGRESS -> COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotStatus {
    /// Synthetic first snapshot, never persisted past the first tick
    Init,
    Pending,
    InProgress,
    Completed,
    /// Terminal, needs an operator
    Failed,
}

impl SnapshotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotStatus::Init => "INIT",
            SnapshotStatus::Pending => "PENDING",
            SnapshotStatus::InProgress => "IN_PROGRESS",
            SnapshotStatus::Completed => "COMPLETED",
            SnapshotStatus::Failed => "FAILED",
        }
    }

    /// PENDING or IN_PROGRESS: the strategy's open round.
    pub fn is_open(&self) -> bool {
        matches!(self, SnapshotStatus::Pending | SnapshotStatus::InProgress)
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SnapshotStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INIT" => Ok(SnapshotStatus::Init),
            "PENDING" => Ok(SnapshotStatus::Pending),
            "IN_PROGRESS" => Ok(SnapshotStatus::InProgress),
            "COMPLETED" => Ok(SnapshotStatus::Completed),
            "FAILED" => Ok(SnapshotStatus::Failed),
            other => Err(EngineError::InvalidState(format!(
                "unknown snapshot status: {other}"
            ))),
        }
    }
}

/// One round of a strategy's cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// None until first saved
    pub id: Option<i64>,
    pub strategy_id: i64,
    /// Accumulation-to-exit round number
    pub cycle: u32,
    /// Monotonic per strategy, +1 for every snapshot
    pub step: u32,
    pub status: SnapshotStatus,
    pub progress: ProgressState,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When an order of this round was last accepted by the broker
    pub executed_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(
        strategy_id: i64,
        cycle: u32,
        step: u32,
        status: SnapshotStatus,
        progress: ProgressState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            strategy_id,
            cycle,
            step,
            status,
            progress,
            last_error: None,
            created_at: now,
            updated_at: now,
            executed_at: None,
        }
    }

    /// Persisted id; unsaved snapshots cannot own orders.
    pub fn require_id(&self) -> EngineResult<i64> {
        self.id.ok_or_else(|| {
            EngineError::InvalidState(format!(
                "snapshot step {} of strategy {} was never saved",
                self.step, self.strategy_id
            ))
        })
    }

    /// Move to FAILED and record why.
    pub fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = SnapshotStatus::Failed;
        self.last_error = Some(reason.into());
        self.executed_at = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AveragingState, ProgressState};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn flat_state() -> ProgressState {
        ProgressState::Averaging(AveragingState {
            t: Decimal::ZERO,
            star: dec!(0.2),
            investment: dec!(10000),
            unit_investment: dec!(500),
            quantity: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            balance: dec!(10000),
            equity: dec!(10000),
            daily_profit: Decimal::ZERO,
        })
    }

    #[test]
    fn test_open_statuses() {
        assert!(SnapshotStatus::Pending.is_open());
        assert!(SnapshotStatus::InProgress.is_open());
        assert!(!SnapshotStatus::Completed.is_open());
        assert!(!SnapshotStatus::Failed.is_open());
        assert!(!SnapshotStatus::Init.is_open());
    }

    #[test]
    fn test_unsaved_snapshot_has_no_id() {
        let snapshot = Snapshot::new(1, 1, 1, SnapshotStatus::Pending, flat_state(), Utc::now());
        assert!(snapshot.require_id().is_err());
    }

    #[test]
    fn test_fail_records_reason() {
        let mut snapshot = Snapshot::new(1, 1, 1, SnapshotStatus::InProgress, flat_state(), Utc::now());
        snapshot.executed_at = Some(Utc::now());
        snapshot.fail("avg_price missing", Utc::now());

        assert_eq!(snapshot.status, SnapshotStatus::Failed);
        assert_eq!(snapshot.last_error.as_deref(), Some("avg_price missing"));
        assert!(snapshot.executed_at.is_none());
    }
}
