//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service.

use crate::config::ConfigError;
use axum::http::StatusCode;
use reading_tracker_core::EngineError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure while applying the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Maps an engine failure onto the status code and message a handler returns.
pub fn engine_error_response(e: &EngineError) -> (StatusCode, String) {
    match e {
        EngineError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        EngineError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        EngineError::Aggregation(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to update reading totals; no changes were saved".to_string(),
        ),
        EngineError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "A storage error occurred".to_string(),
        ),
    }
}
