pub mod activity;
pub mod clock;
pub mod domain;
pub mod engine;
pub mod error;
pub mod goals;
pub mod memory;
pub mod ports;
pub mod progress;
pub mod streak;

pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    Award, Book, BookProgressState, DailyActivityRecord, Goal, GoalType, ProgressLedgerRecord,
    ProgressType, ProgressUpdateOutcome, ReadingState, StreakStats,
};
pub use engine::{ConsistencyMode, ReadingEngine};
pub use error::{EngineError, EngineResult};
pub use memory::InMemoryStore;
pub use ports::{
    BadgeEvaluator, NoBadges, PortError, PortResult, ReadingStore, ReadingTransaction,
};
