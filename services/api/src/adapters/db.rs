//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `ReadingStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Rows the engine reads before writing are taken with `FOR UPDATE`, and the daily
//! totals are bumped with `INSERT .. ON CONFLICT DO UPDATE` so concurrent requests
//! never lose an increment.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reading_tracker_core::domain::{
    Book, BookProgressState, DailyActivityRecord, Goal, GoalType, ProgressLedgerRecord,
    ProgressType,
};
use reading_tracker_core::ports::{PortError, PortResult, ReadingStore, ReadingTransaction};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `ReadingStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct BookRecord {
    id: Uuid,
    title: String,
    total_pages: Option<i32>,
}
impl BookRecord {
    fn to_domain(self) -> Book {
        Book {
            id: self.id,
            title: self.title,
            total_pages: self.total_pages,
        }
    }
}

#[derive(FromRow)]
struct UserBookRecord {
    user_id: Uuid,
    book_id: Uuid,
    progress: i32,
    progress_type: String,
    is_current: bool,
    finished_at: Option<DateTime<Utc>>,
}
impl UserBookRecord {
    fn to_domain(self) -> PortResult<BookProgressState> {
        let progress_type = self
            .progress_type
            .parse::<ProgressType>()
            .map_err(PortError::InvalidInput)?;
        Ok(BookProgressState {
            user_id: self.user_id,
            book_id: self.book_id,
            progress: self.progress,
            progress_type,
            is_current: self.is_current,
            finished_at: self.finished_at,
        })
    }
}

#[derive(FromRow)]
struct DailyActivityRow {
    id: Uuid,
    user_id: Uuid,
    day: NaiveDate,
    minutes_read: i32,
    pages_read: i32,
}
impl DailyActivityRow {
    fn to_domain(self) -> DailyActivityRecord {
        DailyActivityRecord {
            id: self.id,
            user_id: self.user_id,
            day: self.day,
            minutes_read: self.minutes_read,
            pages_read: self.pages_read,
        }
    }
}

#[derive(FromRow)]
struct LedgerRow {
    id: Uuid,
    daily_activity_id: Uuid,
    pages_read: i32,
    books_completed: i32,
}
impl LedgerRow {
    fn to_domain(self) -> ProgressLedgerRecord {
        ProgressLedgerRecord {
            id: self.id,
            daily_activity_id: self.daily_activity_id,
            pages_read: self.pages_read,
            books_completed: self.books_completed,
        }
    }
}

#[derive(FromRow)]
struct GoalRecord {
    id: Uuid,
    user_id: Uuid,
    goal_type: String,
    target: i32,
    progress: i32,
    deadline: NaiveDate,
    completed_at: Option<DateTime<Utc>>,
}
impl GoalRecord {
    fn to_domain(self) -> PortResult<Goal> {
        let goal_type = self
            .goal_type
            .parse::<GoalType>()
            .map_err(PortError::InvalidInput)?;
        Ok(Goal {
            id: self.id,
            user_id: self.user_id,
            goal_type,
            target: self.target,
            progress: self.progress,
            deadline: self.deadline,
            completed_at: self.completed_at,
        })
    }
}

//=========================================================================================
// `ReadingStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ReadingStore for DbAdapter {
    async fn begin(&self) -> PortResult<Box<dyn ReadingTransaction>> {
        let tx = self.pool.begin().await.map_err(unexpected)?;
        Ok(Box::new(DbTransaction { tx }))
    }

    async fn list_qualifying_activity(&self, user_id: Uuid) -> PortResult<Vec<DailyActivityRecord>> {
        let records = sqlx::query_as::<_, DailyActivityRow>(
            "SELECT id, user_id, day, minutes_read, pages_read FROM daily_activity \
             WHERE user_id = $1 AND (pages_read > 0 OR minutes_read > 0) ORDER BY day DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}

//=========================================================================================
// `ReadingTransaction` Trait Implementation
//=========================================================================================

/// A live PostgreSQL transaction. Dropping it without `commit` rolls it back.
pub struct DbTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ReadingTransaction for DbTransaction {
    async fn get_book(&mut self, book_id: Uuid) -> PortResult<Book> {
        let record = sqlx::query_as::<_, BookRecord>(
            "SELECT id, title, total_pages FROM books WHERE id = $1",
        )
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Book {} not found", book_id)))?;
        Ok(record.to_domain())
    }

    async fn lock_book_progress(&mut self, user_id: Uuid, book_id: Uuid) -> PortResult<BookProgressState> {
        let record = sqlx::query_as::<_, UserBookRecord>(
            "SELECT user_id, book_id, progress, progress_type, is_current, finished_at \
             FROM user_books WHERE user_id = $1 AND book_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| {
            PortError::NotFound(format!("Book {} is not in the library of user {}", book_id, user_id))
        })?;
        record.to_domain()
    }

    async fn save_book_progress(&mut self, state: &BookProgressState) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE user_books SET progress = $3, is_current = $4, finished_at = $5, updated_at = now() \
             WHERE user_id = $1 AND book_id = $2",
        )
        .bind(state.user_id)
        .bind(state.book_id)
        .bind(state.progress)
        .bind(state.is_current)
        .bind(state.finished_at)
        .execute(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Book {} not found", state.book_id)));
        }
        Ok(())
    }

    async fn increment_daily_activity(
        &mut self,
        user_id: Uuid,
        day: NaiveDate,
        pages: i32,
        minutes: i32,
    ) -> PortResult<DailyActivityRecord> {
        let record = sqlx::query_as::<_, DailyActivityRow>(
            "INSERT INTO daily_activity (id, user_id, day, pages_read, minutes_read) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, day) DO UPDATE SET \
                 pages_read = daily_activity.pages_read + EXCLUDED.pages_read, \
                 minutes_read = daily_activity.minutes_read + EXCLUDED.minutes_read \
             RETURNING id, user_id, day, minutes_read, pages_read",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(day)
        .bind(pages)
        .bind(minutes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn increment_ledger(
        &mut self,
        daily_activity_id: Uuid,
        pages: i32,
        books_completed: i32,
    ) -> PortResult<ProgressLedgerRecord> {
        let record = sqlx::query_as::<_, LedgerRow>(
            "INSERT INTO progress_ledger (id, daily_activity_id, pages_read, books_completed) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (daily_activity_id) DO UPDATE SET \
                 pages_read = progress_ledger.pages_read + EXCLUDED.pages_read, \
                 books_completed = progress_ledger.books_completed + EXCLUDED.books_completed \
             RETURNING id, daily_activity_id, pages_read, books_completed",
        )
        .bind(Uuid::new_v4())
        .bind(daily_activity_id)
        .bind(pages)
        .bind(books_completed)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn lock_active_goals(&mut self, user_id: Uuid, goal_type: GoalType) -> PortResult<Vec<Goal>> {
        let records = sqlx::query_as::<_, GoalRecord>(
            "SELECT id, user_id, goal_type, target, progress, deadline, completed_at FROM goals \
             WHERE user_id = $1 AND goal_type = $2 AND completed_at IS NULL \
             ORDER BY deadline, id FOR UPDATE",
        )
        .bind(user_id)
        .bind(goal_type.as_str())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn save_goals(&mut self, goals: &[Goal]) -> PortResult<()> {
        for goal in goals {
            sqlx::query("UPDATE goals SET progress = $2, completed_at = $3 WHERE id = $1")
                .bind(goal.id)
                .bind(goal.progress)
                .bind(goal.completed_at)
                .execute(&mut *self.tx)
                .await
                .map_err(unexpected)?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.tx.commit().await.map_err(unexpected)
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        self.tx.rollback().await.map_err(unexpected)
    }
}
