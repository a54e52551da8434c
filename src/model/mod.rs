//! Persisted entities owned by the engine.
//!
//! - `Strategy`: operator-created definition with typed variant and raw parameters
//! - `Snapshot`: one round of a strategy's cycle, carrying the progress state
//! - `OrderRecord`: one submission attempt belonging to a snapshot

mod order;
mod progress;
mod snapshot;
mod strategy;

pub use order::*;
pub use progress::*;
pub use snapshot::*;
pub use strategy::*;

#[cfg(test)]
pub(crate) use order::tests as order_fixtures;
