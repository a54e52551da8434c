//! Engine error taxonomy.
//!
//! | Variant | Effect on the open snapshot |
//! |---------|-----------------------------|
//! | `MarketClosed` | none, retried next tick |
//! | `BrokerRejection` | recorded on the order row |
//! | `InvalidState` / `InvalidParams` | snapshot marked FAILED |
//! | `TransientNetwork` | tick aborts, snapshot keeps its status |
//! | `Storage` | logged only (cannot be recorded) |

use thiserror::Error;

/// Errors raised while executing a strategy tick.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Broker refused an order because the market is closed (holiday or after-hours).
    #[error("market closed: {0}")]
    MarketClosed(String),

    /// Broker refused an order for a reason other than a closed market.
    #[error("order rejected by broker ({code}): {message}")]
    BrokerRejection { code: String, message: String },

    /// A required value is missing or inconsistent for the current phase.
    #[error("invalid strategy state: {0}")]
    InvalidState(String),

    /// Strategy parameters could not be parsed.
    #[error("invalid strategy parameters: {0}")]
    InvalidParams(String),

    /// Broker could not be reached or answered with garbage.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether the tick should be retried later without touching the snapshot.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_) | Self::MarketClosed(_))
    }

    /// Whether the error can be recorded on the snapshot as a FAILED reason.
    pub fn marks_snapshot_failed(&self) -> bool {
        !self.is_transient() && !matches!(self, Self::Storage(_) | Self::NotFound(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(EngineError::TransientNetwork("timeout".into()).is_transient());
        assert!(EngineError::MarketClosed("holiday".into()).is_transient());
        assert!(!EngineError::InvalidState("avg missing".into()).is_transient());
    }

    #[test]
    fn test_failed_marking() {
        assert!(EngineError::InvalidState("x".into()).marks_snapshot_failed());
        assert!(EngineError::InvalidParams("x".into()).marks_snapshot_failed());
        assert!(!EngineError::TransientNetwork("x".into()).marks_snapshot_failed());
        assert!(!EngineError::Storage(anyhow::anyhow!("disk full")).marks_snapshot_failed());
    }

    #[test]
    fn test_json_failures_surface_as_storage() {
        let json = serde_json::from_str::<u32>("not json").unwrap_err();
        let err = EngineError::from(anyhow::Error::from(json).context("Failed to load progress"));
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(!err.marks_snapshot_failed());
        assert!(err.to_string().starts_with("storage error: Failed to load progress"));
    }

    #[test]
    fn test_rejection_display() {
        let err = EngineError::BrokerRejection {
            code: "1".into(),
            message: "insufficient funds".into(),
        };
        assert_eq!(
            err.to_string(),
            "order rejected by broker (1): insufficient funds"
        );
    }
}
