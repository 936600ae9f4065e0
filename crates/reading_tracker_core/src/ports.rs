//! crates/reading_tracker_core/src/ports.rs
//!
//! Defines the service contracts (traits) the engine depends on.
//! These traits form the boundary of the hexagonal architecture, keeping the core
//! independent of the concrete database and of the badge rules service.

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{
    Award, Book, BookProgressState, DailyActivityRecord, Goal, GoalType, ProgressLedgerRecord,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidInput(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Persistence Ports
//=========================================================================================

/// Entry point to the durable store.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// Opens a unit of work. Every read-then-write the engine performs goes through one.
    async fn begin(&self) -> PortResult<Box<dyn ReadingTransaction>>;

    /// All of a user's days with non-zero pages or minutes, in no particular order.
    async fn list_qualifying_activity(&self, user_id: Uuid) -> PortResult<Vec<DailyActivityRecord>>;
}

/// A single transaction against the store.
///
/// Dropping a transaction without calling `commit` discards all of its writes.
#[async_trait]
pub trait ReadingTransaction: Send {
    async fn get_book(&mut self, book_id: Uuid) -> PortResult<Book>;

    /// Loads the user's state for a book and holds it exclusively until the
    /// transaction ends, so concurrent updates to the same book are serialized.
    async fn lock_book_progress(&mut self, user_id: Uuid, book_id: Uuid)
        -> PortResult<BookProgressState>;

    async fn save_book_progress(&mut self, state: &BookProgressState) -> PortResult<()>;

    /// Atomically adds to the day's accumulators, creating the record on first use.
    async fn increment_daily_activity(
        &mut self,
        user_id: Uuid,
        day: NaiveDate,
        pages: i32,
        minutes: i32,
    ) -> PortResult<DailyActivityRecord>;

    /// Atomically adds to the ledger row of a daily record, creating it on first use.
    async fn increment_ledger(
        &mut self,
        daily_activity_id: Uuid,
        pages: i32,
        books_completed: i32,
    ) -> PortResult<ProgressLedgerRecord>;

    /// Loads and locks every goal of the given type that is not completed yet.
    async fn lock_active_goals(&mut self, user_id: Uuid, goal_type: GoalType)
        -> PortResult<Vec<Goal>>;

    async fn save_goals(&mut self, goals: &[Goal]) -> PortResult<()>;

    async fn commit(self: Box<Self>) -> PortResult<()>;

    async fn rollback(self: Box<Self>) -> PortResult<()>;
}

//=========================================================================================
// Collaborator Ports
//=========================================================================================

#[async_trait]
pub trait BadgeEvaluator: Send + Sync {
    /// Runs the badge rules for a user and returns the badges granted by this call.
    /// Safe to call any number of times.
    async fn evaluate_and_award(&self, user_id: Uuid) -> PortResult<Vec<Award>>;
}

/// A badge evaluator that never grants anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBadges;

#[async_trait]
impl BadgeEvaluator for NoBadges {
    async fn evaluate_and_award(&self, _user_id: Uuid) -> PortResult<Vec<Award>> {
        Ok(Vec::new())
    }
}
