//! crates/reading_tracker_core/src/error.rs
//!
//! The error type returned by the engine's public operations.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The book or the user's state for it does not exist. Nothing was written.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request was rejected before any mutation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Updating the daily activity, ledger or goals failed. The whole update was rolled back.
    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<PortError> for EngineError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(msg) => EngineError::NotFound(msg),
            PortError::InvalidInput(msg) => EngineError::InvalidInput(msg),
            PortError::Unexpected(msg) => EngineError::Store(msg),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
