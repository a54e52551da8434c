//! Broker access: the gateway contract, normalized payloads, routing and a paper broker.

mod paper;
mod paper_ledger;
mod router;
mod traits;
mod types;

pub use paper::*;
pub use router::*;
pub use traits::*;
pub use types::*;
