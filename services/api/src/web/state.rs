//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use reading_tracker_core::ReadingEngine;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReadingEngine>,
    pub config: Arc<Config>,
}
