//! Tick engine: reconciliation, snapshot transitions, placement, scheduling.

mod clock;
mod reconciler;
mod runner;
mod scheduler;
mod state_machine;

pub use clock::{Clock, ManualClock, SystemClock, TradingCalendar};
pub use reconciler::{OrderReconciler, ReconcileReport};
pub use runner::{StrategyRunner, TickOutcome};
pub use scheduler::TickScheduler;
pub use state_machine::{PlacementVerdict, SnapshotStateMachine};
