//! crates/reading_tracker_core/src/memory.rs
//!
//! An in-memory implementation of the persistence ports.
//!
//! Transactions take an exclusive lock on the whole store for their lifetime and
//! work on a private copy, so commits are all-or-nothing and concurrent updates
//! are serialized. Backs the engine and router test suites.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    Book, BookProgressState, DailyActivityRecord, Goal, GoalType, ProgressLedgerRecord,
};
use crate::ports::{PortError, PortResult, ReadingStore, ReadingTransaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    books: HashMap<Uuid, Book>,
    book_progress: HashMap<(Uuid, Uuid), BookProgressState>,
    daily_activity: HashMap<(Uuid, NaiveDate), DailyActivityRecord>,
    /// Keyed by daily activity id.
    ledger: HashMap<Uuid, ProgressLedgerRecord>,
    goals: HashMap<Uuid, Goal>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Seeding ---

    pub async fn insert_book(&self, book: Book) {
        self.tables.lock().await.books.insert(book.id, book);
    }

    pub async fn insert_book_progress(&self, state: BookProgressState) {
        self.tables
            .lock()
            .await
            .book_progress
            .insert((state.user_id, state.book_id), state);
    }

    pub async fn insert_goal(&self, goal: Goal) {
        self.tables.lock().await.goals.insert(goal.id, goal);
    }

    pub async fn insert_daily_activity(&self, record: DailyActivityRecord) {
        self.tables
            .lock()
            .await
            .daily_activity
            .insert((record.user_id, record.day), record);
    }

    // --- Inspection ---

    pub async fn book_progress(&self, user_id: Uuid, book_id: Uuid) -> Option<BookProgressState> {
        self.tables
            .lock()
            .await
            .book_progress
            .get(&(user_id, book_id))
            .cloned()
    }

    pub async fn goal(&self, goal_id: Uuid) -> Option<Goal> {
        self.tables.lock().await.goals.get(&goal_id).cloned()
    }

    pub async fn daily_activity(&self, user_id: Uuid, day: NaiveDate) -> Option<DailyActivityRecord> {
        self.tables
            .lock()
            .await
            .daily_activity
            .get(&(user_id, day))
            .cloned()
    }

    pub async fn ledger(&self, user_id: Uuid, day: NaiveDate) -> Option<ProgressLedgerRecord> {
        let tables = self.tables.lock().await;
        let daily = tables.daily_activity.get(&(user_id, day))?;
        tables.ledger.get(&daily.id).cloned()
    }
}

#[async_trait]
impl ReadingStore for InMemoryStore {
    async fn begin(&self) -> PortResult<Box<dyn ReadingTransaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, working }))
    }

    async fn list_qualifying_activity(&self, user_id: Uuid) -> PortResult<Vec<DailyActivityRecord>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .daily_activity
            .values()
            .filter(|r| r.user_id == user_id && r.is_qualifying())
            .cloned()
            .collect())
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl ReadingTransaction for InMemoryTransaction {
    async fn get_book(&mut self, book_id: Uuid) -> PortResult<Book> {
        self.working
            .books
            .get(&book_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))
    }

    async fn lock_book_progress(&mut self, user_id: Uuid, book_id: Uuid) -> PortResult<BookProgressState> {
        self.working
            .book_progress
            .get(&(user_id, book_id))
            .cloned()
            .ok_or_else(|| {
                PortError::NotFound(format!("Book {} is not in the library of user {}", book_id, user_id))
            })
    }

    async fn save_book_progress(&mut self, state: &BookProgressState) -> PortResult<()> {
        let slot = self
            .working
            .book_progress
            .get_mut(&(state.user_id, state.book_id))
            .ok_or_else(|| PortError::NotFound(format!("Book {} not found", state.book_id)))?;
        *slot = state.clone();
        Ok(())
    }

    async fn increment_daily_activity(
        &mut self,
        user_id: Uuid,
        day: NaiveDate,
        pages: i32,
        minutes: i32,
    ) -> PortResult<DailyActivityRecord> {
        let record = self
            .working
            .daily_activity
            .entry((user_id, day))
            .or_insert_with(|| DailyActivityRecord {
                id: Uuid::new_v4(),
                user_id,
                day,
                minutes_read: 0,
                pages_read: 0,
            });
        record.pages_read += pages;
        record.minutes_read += minutes;
        Ok(record.clone())
    }

    async fn increment_ledger(
        &mut self,
        daily_activity_id: Uuid,
        pages: i32,
        books_completed: i32,
    ) -> PortResult<ProgressLedgerRecord> {
        let record = self
            .working
            .ledger
            .entry(daily_activity_id)
            .or_insert_with(|| ProgressLedgerRecord {
                id: Uuid::new_v4(),
                daily_activity_id,
                pages_read: 0,
                books_completed: 0,
            });
        record.pages_read += pages;
        record.books_completed += books_completed;
        Ok(record.clone())
    }

    async fn lock_active_goals(&mut self, user_id: Uuid, goal_type: GoalType) -> PortResult<Vec<Goal>> {
        let mut goals: Vec<Goal> = self
            .working
            .goals
            .values()
            .filter(|g| g.user_id == user_id && g.goal_type == goal_type && g.is_active())
            .cloned()
            .collect();
        goals.sort_by_key(|g| (g.deadline, g.id));
        Ok(goals)
    }

    async fn save_goals(&mut self, goals: &[Goal]) -> PortResult<()> {
        for goal in goals {
            let slot = self
                .working
                .goals
                .get_mut(&goal.id)
                .ok_or_else(|| PortError::NotFound(format!("Goal {} not found", goal.id)))?;
            *slot = goal.clone();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        let InMemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        Ok(())
    }
}
