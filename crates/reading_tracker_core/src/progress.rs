//! crates/reading_tracker_core/src/progress.rs
//!
//! The progress update processor: turns a new progress value for a book into
//! the saved book state plus every aggregate that depends on it.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity;
use crate::domain::{
    Award, Book, BookProgressState, GoalType, ProgressType, ProgressUpdateOutcome, ReadingState,
};
use crate::engine::{ConsistencyMode, ReadingEngine};
use crate::error::{EngineError, EngineResult};
use crate::goals;
use crate::ports::{PortResult, ReadingTransaction};

//=========================================================================================
// Derived Facts
//=========================================================================================

/// What a single update changes, computed before anything is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressChange {
    pub previous: ReadingState,
    pub next: ReadingState,
    pub pages_delta: i32,
    pub newly_finished: bool,
}

/// Rejects values below zero or above the book's maximum.
pub fn validate_progress(new_progress: i32, progress_type: ProgressType, book: &Book) -> EngineResult<()> {
    if new_progress < 0 {
        return Err(EngineError::InvalidInput(format!(
            "progress must not be negative, got {}",
            new_progress
        )));
    }
    if let Some(max) = progress_type.max_progress(book) {
        if new_progress > max {
            return Err(EngineError::InvalidInput(format!(
                "progress {} exceeds the maximum of {} for {} tracking",
                new_progress, max, progress_type
            )));
        }
    }
    Ok(())
}

/// Pages gained (or lost, when negative) between two progress values.
///
/// Percentages are converted with floor on each side; without a page count
/// no page-level delta can be derived and the result is zero.
pub fn pages_delta(
    previous: i32,
    new_progress: i32,
    progress_type: ProgressType,
    total_pages: Option<i32>,
) -> i32 {
    match progress_type {
        ProgressType::PageCount => new_progress - previous,
        ProgressType::Percentage => match total_pages {
            Some(total) => percent_to_pages(new_progress, total) - percent_to_pages(previous, total),
            None => 0,
        },
    }
}

fn percent_to_pages(percent: i32, total_pages: i32) -> i32 {
    // Both operands are non-negative, so integer division is the floor.
    (i64::from(percent) * i64::from(total_pages) / 100) as i32
}

pub fn evaluate_change(current: &BookProgressState, book: &Book, new_progress: i32) -> ProgressChange {
    let max = current.progress_type.max_progress(book);
    let previous = ReadingState::from_progress(current.progress, max);
    let next = ReadingState::from_progress(new_progress, max);
    let was_already_finished = current.finished_at.is_some();

    ProgressChange {
        previous,
        next,
        pages_delta: pages_delta(current.progress, new_progress, current.progress_type, book.total_pages),
        newly_finished: next.is_finished() && !was_already_finished,
    }
}

/// The book state to persist. Leaving the finished state clears `finished_at`.
pub fn next_book_state(
    current: &BookProgressState,
    new_progress: i32,
    change: &ProgressChange,
    now: DateTime<Utc>,
) -> BookProgressState {
    BookProgressState {
        progress: new_progress,
        is_current: change.next.is_current(),
        finished_at: change.next.is_finished().then_some(now),
        ..current.clone()
    }
}

//=========================================================================================
// Processor
//=========================================================================================

impl ReadingEngine {
    /// Records a new progress value for one of the user's books.
    ///
    /// Fails with `NotFound` when the book or the user's state for it is missing and
    /// with `InvalidInput` when the value is out of range; neither writes anything.
    pub async fn update_progress(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        new_progress: i32,
    ) -> EngineResult<ProgressUpdateOutcome> {
        if new_progress < 0 {
            return Err(EngineError::InvalidInput(format!(
                "progress must not be negative, got {}",
                new_progress
            )));
        }

        let now = self.clock.now();
        let today = self.clock.today();

        let mut outcome = match self.consistency {
            ConsistencyMode::Atomic => self.update_atomically(user_id, book_id, new_progress, now, today).await?,
            ConsistencyMode::BestEffort => self.update_best_effort(user_id, book_id, new_progress, now, today).await?,
        };

        info!(
            %user_id,
            %book_id,
            progress = outcome.book_state.progress,
            pages_delta = outcome.pages_delta,
            newly_finished = outcome.newly_finished,
            "Progress updated"
        );

        if outcome.newly_finished {
            outcome.newly_awarded_badges = self.collect_badges(user_id).await;
        }
        Ok(outcome)
    }

    async fn update_atomically(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        new_progress: i32,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> EngineResult<ProgressUpdateOutcome> {
        let mut tx = self.store.begin().await?;

        let written = write_book_state(tx.as_mut(), user_id, book_id, new_progress, now).await;
        let (book_state, change) = match written {
            Ok(written) => written,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };

        let propagated = propagate(tx.as_mut(), user_id, &change, today, now).await;
        if let Err(e) = propagated {
            discard(tx).await;
            return Err(EngineError::Aggregation(e.to_string()));
        }

        tx.commit().await?;
        Ok(outcome(book_state, &change, None))
    }

    async fn update_best_effort(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        new_progress: i32,
        now: DateTime<Utc>,
        today: NaiveDate,
    ) -> EngineResult<ProgressUpdateOutcome> {
        let mut tx = self.store.begin().await?;
        let written = write_book_state(tx.as_mut(), user_id, book_id, new_progress, now).await;
        let (book_state, change) = match written {
            Ok(written) => written,
            Err(e) => {
                discard(tx).await;
                return Err(e);
            }
        };
        tx.commit().await?;

        let aggregation_error = match self.propagate_separately(user_id, &change, today, now).await {
            Ok(()) => None,
            Err(e) => {
                warn!(%user_id, %book_id, error = %e, "Book progress saved but aggregates are stale");
                Some(e.to_string())
            }
        };

        Ok(outcome(book_state, &change, aggregation_error))
    }

    async fn propagate_separately(
        &self,
        user_id: Uuid,
        change: &ProgressChange,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut tx = self.store.begin().await?;
        let propagated = propagate(tx.as_mut(), user_id, change, today, now).await;
        match propagated {
            Ok(()) => tx.commit().await,
            Err(e) => {
                discard(tx).await;
                Err(e)
            }
        }
    }

    /// Badge failures are never fatal: the progress is already saved.
    async fn collect_badges(&self, user_id: Uuid) -> Vec<Award> {
        match self.badges.evaluate_and_award(user_id).await {
            Ok(awards) => {
                if !awards.is_empty() {
                    info!(%user_id, count = awards.len(), "Badges awarded");
                }
                awards
            }
            Err(e) => {
                warn!(%user_id, error = %e, "Badge evaluation failed; reporting no new badges");
                Vec::new()
            }
        }
    }
}

/// Loads and locks the current state, validates the new value and saves the new state.
async fn write_book_state(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    book_id: Uuid,
    new_progress: i32,
    now: DateTime<Utc>,
) -> EngineResult<(BookProgressState, ProgressChange)> {
    let book = tx.get_book(book_id).await?;
    let current = tx.lock_book_progress(user_id, book_id).await?;
    validate_progress(new_progress, current.progress_type, &book)?;

    let change = evaluate_change(&current, &book, new_progress);
    debug!(
        %user_id,
        %book_id,
        previous = current.progress,
        new_progress,
        ?change,
        "Progress change evaluated"
    );

    let next = next_book_state(&current, new_progress, &change, now);
    tx.save_book_progress(&next).await?;
    Ok((next, change))
}

/// Pushes a change into the daily activity, ledger and goals.
async fn propagate(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    change: &ProgressChange,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> PortResult<()> {
    if change.pages_delta > 0 {
        let books_completed = i32::from(change.newly_finished);
        activity::record_activity(tx, user_id, today, change.pages_delta, books_completed).await?;
    }
    if change.newly_finished {
        goals::advance_goals(tx, user_id, GoalType::Books, 1, now).await?;
    }
    if change.pages_delta > 0 {
        goals::advance_goals(tx, user_id, GoalType::Pages, change.pages_delta, now).await?;
    }
    Ok(())
}

pub(crate) async fn discard(tx: Box<dyn ReadingTransaction>) {
    if let Err(e) = tx.rollback().await {
        warn!(error = %e, "Rollback failed");
    }
}

fn outcome(book_state: BookProgressState, change: &ProgressChange, aggregation_error: Option<String>) -> ProgressUpdateOutcome {
    ProgressUpdateOutcome {
        book_state,
        newly_awarded_badges: Vec::new(),
        pages_delta: change.pages_delta,
        newly_finished: change.newly_finished,
        aggregation_error,
    }
}
