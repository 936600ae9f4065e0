//! crates/reading_tracker_core/src/domain.rs
//!
//! Defines the pure, core data structures for the reading tracker.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Books and Per-User Book Progress
//=========================================================================================

/// A book from the catalog. Only the page count matters to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    /// `None` when the catalog never reported a page count.
    pub total_pages: Option<i32>,
}

/// How a user records progress for a given book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressType {
    Percentage,
    PageCount,
}

impl ProgressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressType::Percentage => "PERCENTAGE",
            ProgressType::PageCount => "PAGE_COUNT",
        }
    }

    /// The value at which a book counts as finished, if it is known.
    pub fn max_progress(&self, book: &Book) -> Option<i32> {
        match self {
            ProgressType::Percentage => Some(100),
            ProgressType::PageCount => book.total_pages,
        }
    }
}

impl fmt::Display for ProgressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProgressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PERCENTAGE" => Ok(ProgressType::Percentage),
            "PAGE_COUNT" => Ok(ProgressType::PageCount),
            other => Err(format!("unknown progress type '{}'", other)),
        }
    }
}

/// Where a book sits in a user's reading lifecycle.
///
/// Derived solely from the progress value and the book's maximum, so every
/// transition (including "un-finishing" a book) is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingState {
    NotStarted,
    InProgress,
    Finished,
}

impl ReadingState {
    pub fn from_progress(progress: i32, max: Option<i32>) -> Self {
        match max {
            Some(max) if progress == max => ReadingState::Finished,
            _ if progress == 0 => ReadingState::NotStarted,
            _ => ReadingState::InProgress,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, ReadingState::InProgress)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ReadingState::Finished)
    }
}

/// A user's progress on a single book (one per user x book).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookProgressState {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub progress: i32,
    pub progress_type: ProgressType,
    pub is_current: bool,
    pub finished_at: Option<DateTime<Utc>>,
}

//=========================================================================================
// Daily Aggregates
//=========================================================================================

/// Per-user, per-calendar-day activity totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyActivityRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub day: NaiveDate,
    pub minutes_read: i32,
    pub pages_read: i32,
}

impl DailyActivityRecord {
    /// A day counts towards streaks when anything at all was read.
    pub fn is_qualifying(&self) -> bool {
        self.pages_read > 0 || self.minutes_read > 0
    }
}

/// The rollup record kept alongside each `DailyActivityRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLedgerRecord {
    pub id: Uuid,
    pub daily_activity_id: Uuid,
    pub pages_read: i32,
    pub books_completed: i32,
}

//=========================================================================================
// Goals and Awards
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoalType {
    Books,
    Pages,
    Time,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Books => "BOOKS",
            GoalType::Pages => "PAGES",
            GoalType::Time => "TIME",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoalType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKS" => Ok(GoalType::Books),
            "PAGES" => Ok(GoalType::Pages),
            "TIME" => Ok(GoalType::Time),
            other => Err(format!("unknown goal type '{}'", other)),
        }
    }
}

/// A time-boxed reading goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub goal_type: GoalType,
    pub target: i32,
    pub progress: i32,
    pub deadline: NaiveDate,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn is_active(&self) -> bool {
        self.completed_at.is_none()
    }
}

/// A badge granted by the badge collaborator. Opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub id: Uuid,
    pub name: String,
    pub awarded_at: DateTime<Utc>,
}

//=========================================================================================
// Engine Results
//=========================================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreakStats {
    pub current_streak: u32,
    pub longest_streak: u32,
}

/// Everything a single progress update produced.
#[derive(Debug, Clone)]
pub struct ProgressUpdateOutcome {
    pub book_state: BookProgressState,
    pub newly_awarded_badges: Vec<Award>,
    pub pages_delta: i32,
    pub newly_finished: bool,
    /// Set only when the book state was saved but the aggregates were not.
    pub aggregation_error: Option<String>,
}
