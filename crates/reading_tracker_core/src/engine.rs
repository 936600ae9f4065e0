//! crates/reading_tracker_core/src/engine.rs
//!
//! The `ReadingEngine`: the public face of the core. Progress updates live in
//! `progress.rs`; this file holds construction, streaks and reading minutes.

use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::activity;
use crate::clock::{Clock, SystemClock};
use crate::domain::{DailyActivityRecord, GoalType, StreakStats};
use crate::error::{EngineError, EngineResult};
use crate::goals;
use crate::ports::{BadgeEvaluator, NoBadges, PortResult, ReadingStore, ReadingTransaction};
use crate::progress::discard;
use crate::streak;

/// How a progress update treats its derived aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsistencyMode {
    /// Book state, daily activity, ledger and goals commit together or not at all.
    #[default]
    Atomic,
    /// The book state commits first; aggregates follow in their own transaction and
    /// a failure there is reported alongside the saved book state.
    BestEffort,
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyMode::Atomic => f.write_str("atomic"),
            ConsistencyMode::BestEffort => f.write_str("best_effort"),
        }
    }
}

impl FromStr for ConsistencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "atomic" => Ok(ConsistencyMode::Atomic),
            "best_effort" | "best-effort" => Ok(ConsistencyMode::BestEffort),
            other => Err(format!("'{}' is not a consistency mode", other)),
        }
    }
}

pub struct ReadingEngine {
    pub(crate) store: Arc<dyn ReadingStore>,
    pub(crate) badges: Arc<dyn BadgeEvaluator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) consistency: ConsistencyMode,
}

impl ReadingEngine {
    /// Creates an engine on the system clock that never awards badges.
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            store,
            badges: Arc::new(NoBadges),
            clock: Arc::new(SystemClock),
            consistency: ConsistencyMode::default(),
        }
    }

    pub fn with_badges(mut self, badges: Arc<dyn BadgeEvaluator>) -> Self {
        self.badges = badges;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_consistency(mut self, consistency: ConsistencyMode) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn consistency(&self) -> ConsistencyMode {
        self.consistency
    }

    /// Current and longest streaks as of the clock's today. Empty history yields zeros.
    pub async fn get_streak_stats(&self, user_id: Uuid) -> EngineResult<StreakStats> {
        let records = self.store.list_qualifying_activity(user_id).await?;
        let days: Vec<_> = records
            .iter()
            .filter(|r| r.is_qualifying())
            .map(|r| r.day)
            .collect();
        Ok(streak::calculate_streaks(&days, self.clock.today()))
    }

    /// Adds reading time to today's record and advances the user's TIME goals.
    pub async fn record_reading_minutes(
        &self,
        user_id: Uuid,
        minutes: i32,
    ) -> EngineResult<DailyActivityRecord> {
        if minutes <= 0 {
            return Err(EngineError::InvalidInput(format!(
                "minutes read must be positive, got {}",
                minutes
            )));
        }

        let now = self.clock.now();
        let today = self.clock.today();
        let mut tx = self.store.begin().await?;

        let recorded = record_minutes_and_goals(tx.as_mut(), user_id, minutes, now, today).await;
        match recorded {
            Ok(daily) => {
                tx.commit().await?;
                info!(%user_id, minutes, day = %today, "Reading minutes recorded");
                Ok(daily)
            }
            Err(e) => {
                discard(tx).await;
                Err(EngineError::Aggregation(e.to_string()))
            }
        }
    }
}

async fn record_minutes_and_goals(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    minutes: i32,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> PortResult<DailyActivityRecord> {
    let daily = activity::record_minutes(tx, user_id, today, minutes).await?;
    goals::advance_goals(tx, user_id, GoalType::Time, minutes, now).await?;
    Ok(daily)
}
