//! crates/reading_tracker_core/src/activity.rs
//!
//! Keeps the daily activity record and its ledger row in lockstep.

use chrono::NaiveDate;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{DailyActivityRecord, ProgressLedgerRecord};
use crate::ports::{PortError, PortResult, ReadingTransaction};

/// Adds pages (and at most one finished book) to the user's totals for `day`.
///
/// Both records are written inside `tx`; their `pages_read` must agree afterwards
/// or the write is reported as failed.
pub async fn record_activity(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    day: NaiveDate,
    pages_delta: i32,
    books_completed_delta: i32,
) -> PortResult<(DailyActivityRecord, ProgressLedgerRecord)> {
    if pages_delta < 0 || !(0..=1).contains(&books_completed_delta) {
        return Err(PortError::InvalidInput(format!(
            "activity deltas out of range: pages {}, books {}",
            pages_delta, books_completed_delta
        )));
    }

    let daily = tx.increment_daily_activity(user_id, day, pages_delta, 0).await?;
    let ledger = tx
        .increment_ledger(daily.id, pages_delta, books_completed_delta)
        .await?;

    if daily.pages_read != ledger.pages_read {
        return Err(PortError::Unexpected(format!(
            "daily activity {} has {} pages but its ledger has {}",
            daily.id, daily.pages_read, ledger.pages_read
        )));
    }

    debug!(
        %user_id,
        %day,
        pages_read = daily.pages_read,
        books_completed = ledger.books_completed,
        "Daily activity recorded"
    );
    Ok((daily, ledger))
}

/// Adds reading minutes to the user's record for `day`. The ledger does not track minutes.
pub async fn record_minutes(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    day: NaiveDate,
    minutes: i32,
) -> PortResult<DailyActivityRecord> {
    if minutes <= 0 {
        return Err(PortError::InvalidInput(format!(
            "minutes read must be positive, got {}",
            minutes
        )));
    }
    tx.increment_daily_activity(user_id, day, 0, minutes).await
}
