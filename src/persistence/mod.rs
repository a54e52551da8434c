//! Storage of strategies, snapshots and orders.
//!
//! The engine only depends on [`StrategyRepository`]. [`SqliteRepository`]
//! is the bundled implementation.

mod sqlite;

pub use sqlite::SqliteRepository;

use crate::model::{NewStrategy, OrderRecord, Snapshot, Strategy, StrategyStatus};
use anyhow::Result;
use chrono::{DateTime, Utc};

/// Persistence contract consumed by the engine and the CLI.
///
/// Every call is its own unit of work; multi-row writes are atomic.
pub trait StrategyRepository: Send + Sync {
    fn create_strategy(&self, new: &NewStrategy, now: DateTime<Utc>) -> Result<Strategy>;

    fn get_strategy(&self, name: &str) -> Result<Option<Strategy>>;

    /// All strategies, optionally filtered by status, ordered by id.
    fn list_strategies(&self, status: Option<StrategyStatus>) -> Result<Vec<Strategy>>;

    fn set_strategy_status(&self, id: i64, status: StrategyStatus, now: DateTime<Utc>) -> Result<()>;

    /// Delete a strategy with its snapshots and orders.
    fn delete_strategy(&self, id: i64) -> Result<()>;

    /// Snapshot with the highest step.
    fn get_latest_snapshot(&self, strategy_id: i64) -> Result<Option<Snapshot>>;

    fn get_snapshot(&self, id: i64) -> Result<Option<Snapshot>>;

    /// All snapshots of a strategy, oldest first.
    fn list_snapshots(&self, strategy_id: i64) -> Result<Vec<Snapshot>>;

    /// Insert when `id` is None (assigning it), update otherwise.
    fn save_snapshot(&self, snapshot: &mut Snapshot) -> Result<()>;

    /// Update `closing` and insert `opening` atomically.
    fn roll_snapshot(&self, closing: &mut Snapshot, opening: &mut Snapshot) -> Result<()>;

    fn list_orders(&self, snapshot_id: i64) -> Result<Vec<OrderRecord>>;

    /// Orders of every snapshot of the given cycle.
    fn list_cycle_orders(&self, strategy_id: i64, cycle: u32) -> Result<Vec<OrderRecord>>;

    /// Insert when `id` is None (assigning it), update otherwise.
    fn save_order(&self, order: &mut OrderRecord) -> Result<()>;

    /// Save several orders in one transaction.
    fn save_orders(&self, orders: &mut [OrderRecord]) -> Result<()>;
}
