//! Integration tests for the reading engine against the in-memory store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use reading_tracker_core::{
    Award, BadgeEvaluator, Book, Clock, BookProgressState, ConsistencyMode, DailyActivityRecord,
    EngineError, Goal, GoalType, InMemoryStore, ManualClock, PortError, PortResult,
    ProgressLedgerRecord, ProgressType, ReadingEngine, ReadingStore, ReadingTransaction,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// Fixtures
//=========================================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 10, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    start_time().date_naive()
}

struct ScriptedBadges {
    calls: AtomicUsize,
    fail: bool,
}

impl ScriptedBadges {
    fn granting() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail: false })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0), fail: true })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BadgeEvaluator for ScriptedBadges {
    async fn evaluate_and_award(&self, _user_id: Uuid) -> PortResult<Vec<Award>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PortError::Unexpected("badge service unavailable".to_string()));
        }
        Ok(vec![Award {
            id: Uuid::new_v4(),
            name: "First Finish".to_string(),
            awarded_at: start_time(),
        }])
    }
}

struct Library {
    store: InMemoryStore,
    clock: Arc<ManualClock>,
    user_id: Uuid,
}

impl Library {
    fn new() -> Self {
        Self {
            store: InMemoryStore::new(),
            clock: Arc::new(ManualClock::new(start_time())),
            user_id: Uuid::new_v4(),
        }
    }

    fn engine(&self) -> ReadingEngine {
        ReadingEngine::new(Arc::new(self.store.clone())).with_clock(self.clock.clone())
    }

    async fn add_book(&self, total_pages: Option<i32>, progress_type: ProgressType) -> Uuid {
        let book = Book {
            id: Uuid::new_v4(),
            title: "The Name of the Rose".to_string(),
            total_pages,
        };
        let book_id = book.id;
        self.store.insert_book(book).await;
        self.store
            .insert_book_progress(BookProgressState {
                user_id: self.user_id,
                book_id,
                progress: 0,
                progress_type,
                is_current: false,
                finished_at: None,
            })
            .await;
        book_id
    }

    async fn add_goal(&self, goal_type: GoalType, target: i32, progress: i32) -> Uuid {
        let goal = Goal {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            goal_type,
            target,
            progress,
            deadline: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            completed_at: None,
        };
        let id = goal.id;
        self.store.insert_goal(goal).await;
        id
    }

    async fn goal(&self, id: Uuid) -> Goal {
        self.store.goal(id).await.expect("goal exists")
    }

    async fn today_totals(&self) -> (Option<DailyActivityRecord>, Option<ProgressLedgerRecord>) {
        let day = self.clock.now().date_naive();
        (
            self.store.daily_activity(self.user_id, day).await,
            self.store.ledger(self.user_id, day).await,
        )
    }
}

//=========================================================================================
// Progress Updates
//=========================================================================================

#[tokio::test]
async fn page_count_update_feeds_daily_activity_ledger_and_page_goals() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(250), ProgressType::PageCount).await;
    let pages_goal = lib.add_goal(GoalType::Pages, 1000, 0).await;
    let engine = lib.engine();

    let outcome = engine.update_progress(lib.user_id, book_id, 120).await.unwrap();
    assert_eq!(outcome.pages_delta, 120);
    assert!(outcome.book_state.is_current);
    assert!(!outcome.newly_finished);

    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 120);
    let ledger = ledger.unwrap();
    assert_eq!(ledger.pages_read, 120);
    assert_eq!(ledger.books_completed, 0);
    assert_eq!(lib.goal(pages_goal).await.progress, 120);
}

#[tokio::test]
async fn reaching_the_last_page_finishes_the_book_once() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(250), ProgressType::PageCount).await;
    let books_goal = lib.add_goal(GoalType::Books, 12, 3).await;
    let badges = ScriptedBadges::granting();
    let engine = lib.engine().with_badges(badges.clone());

    let outcome = engine.update_progress(lib.user_id, book_id, 250).await.unwrap();
    assert!(outcome.newly_finished);
    assert!(!outcome.book_state.is_current);
    assert_eq!(outcome.book_state.finished_at, Some(start_time()));
    assert_eq!(outcome.newly_awarded_badges.len(), 1);
    assert_eq!(badges.calls(), 1);

    let (_, ledger) = lib.today_totals().await;
    assert_eq!(ledger.unwrap().books_completed, 1);
    assert_eq!(lib.goal(books_goal).await.progress, 4);

    // Submitting the same value again changes nothing.
    let again = engine.update_progress(lib.user_id, book_id, 250).await.unwrap();
    assert!(!again.newly_finished);
    assert_eq!(again.pages_delta, 0);
    assert!(again.newly_awarded_badges.is_empty());
    assert_eq!(badges.calls(), 1);

    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 250);
    assert_eq!(ledger.unwrap().books_completed, 1);
    assert_eq!(lib.goal(books_goal).await.progress, 4);
}

#[tokio::test]
async fn percentage_progress_converts_to_pages_with_floor() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(300), ProgressType::Percentage).await;
    let engine = lib.engine();

    let first = engine.update_progress(lib.user_id, book_id, 33).await.unwrap();
    assert_eq!(first.pages_delta, 99);
    let second = engine.update_progress(lib.user_id, book_id, 66).await.unwrap();
    assert_eq!(second.pages_delta, 99);

    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 198);
    assert_eq!(ledger.unwrap().pages_read, 198);
}

#[tokio::test]
async fn percentage_without_page_count_still_finishes_but_adds_no_pages() {
    let lib = Library::new();
    let book_id = lib.add_book(None, ProgressType::Percentage).await;
    let pages_goal = lib.add_goal(GoalType::Pages, 500, 0).await;
    let books_goal = lib.add_goal(GoalType::Books, 5, 0).await;
    let engine = lib.engine();

    let outcome = engine.update_progress(lib.user_id, book_id, 100).await.unwrap();
    assert!(outcome.newly_finished);
    assert_eq!(outcome.pages_delta, 0);

    // No pages were gained, so the day is untouched; the finish still counts for goals.
    let (daily, ledger) = lib.today_totals().await;
    assert!(daily.is_none());
    assert!(ledger.is_none());
    assert_eq!(lib.goal(pages_goal).await.progress, 0);
    assert_eq!(lib.goal(books_goal).await.progress, 1);
}

#[tokio::test]
async fn going_backwards_touches_no_aggregates() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(400), ProgressType::PageCount).await;
    let pages_goal = lib.add_goal(GoalType::Pages, 1000, 0).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, book_id, 150).await.unwrap();
    let back = engine.update_progress(lib.user_id, book_id, 90).await.unwrap();
    assert_eq!(back.pages_delta, -60);
    assert_eq!(back.book_state.progress, 90);

    let (daily, _) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 150);
    assert_eq!(lib.goal(pages_goal).await.progress, 150);
}

#[tokio::test]
async fn refinishing_after_unfinishing_counts_again() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(200), ProgressType::PageCount).await;
    let books_goal = lib.add_goal(GoalType::Books, 10, 0).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, book_id, 200).await.unwrap();

    let unfinished = engine.update_progress(lib.user_id, book_id, 180).await.unwrap();
    assert_eq!(unfinished.book_state.finished_at, None);
    assert!(unfinished.book_state.is_current);

    let refinished = engine.update_progress(lib.user_id, book_id, 200).await.unwrap();
    assert!(refinished.newly_finished);
    assert_eq!(refinished.pages_delta, 20);

    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 220);
    let ledger = ledger.unwrap();
    assert_eq!(ledger.pages_read, 220);
    assert_eq!(ledger.books_completed, 2);
    assert_eq!(lib.goal(books_goal).await.progress, 2);
}

#[tokio::test]
async fn one_finish_advances_every_active_books_goal() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(100), ProgressType::PageCount).await;
    let small = lib.add_goal(GoalType::Books, 5, 4).await;
    let large = lib.add_goal(GoalType::Books, 10, 9).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, book_id, 100).await.unwrap();

    let small = lib.goal(small).await;
    assert_eq!(small.progress, 5);
    assert_eq!(small.completed_at, Some(start_time()));
    let large = lib.goal(large).await;
    assert_eq!(large.progress, 10);
    assert_eq!(large.completed_at, Some(start_time()));
}

#[tokio::test]
async fn completed_goals_are_left_alone() {
    let lib = Library::new();
    let first = lib.add_book(Some(100), ProgressType::PageCount).await;
    let second = lib.add_book(Some(100), ProgressType::PageCount).await;
    let goal_id = lib.add_goal(GoalType::Books, 1, 0).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, first, 100).await.unwrap();
    lib.clock.advance(Duration::hours(2));
    engine.update_progress(lib.user_id, second, 100).await.unwrap();

    let goal = lib.goal(goal_id).await;
    assert_eq!(goal.progress, 1);
    assert_eq!(goal.completed_at, Some(start_time()));
}

#[tokio::test]
async fn activity_lands_on_the_clock_day() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(500), ProgressType::PageCount).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, book_id, 40).await.unwrap();
    lib.clock.advance(Duration::days(1));
    engine.update_progress(lib.user_id, book_id, 100).await.unwrap();

    let yesterday = lib.store.daily_activity(lib.user_id, today()).await.unwrap();
    let (now, _) = lib.today_totals().await;
    assert_eq!(yesterday.pages_read, 40);
    assert_eq!(now.unwrap().pages_read, 60);
}

//=========================================================================================
// Failures
//=========================================================================================

#[tokio::test]
async fn unknown_book_is_not_found_and_writes_nothing() {
    let lib = Library::new();
    let engine = lib.engine();

    let err = engine
        .update_progress(lib.user_id, Uuid::new_v4(), 10)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(lib.today_totals().await, (None, None));
}

#[tokio::test]
async fn book_outside_the_library_is_not_found() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(100), ProgressType::PageCount).await;
    let engine = lib.engine();

    let stranger = Uuid::new_v4();
    let err = engine.update_progress(stranger, book_id, 10).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn out_of_range_progress_is_rejected_before_any_write() {
    let lib = Library::new();
    let pct = lib.add_book(Some(100), ProgressType::Percentage).await;
    let pages = lib.add_book(Some(250), ProgressType::PageCount).await;
    let engine = lib.engine();

    for (book_id, value) in [(pct, 101), (pct, -1), (pages, 251)] {
        let err = engine.update_progress(lib.user_id, book_id, value).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)), "value {value}");
    }
    assert_eq!(lib.store.book_progress(lib.user_id, pages).await.unwrap().progress, 0);
}

#[tokio::test]
async fn badge_failure_keeps_the_progress_update() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(100), ProgressType::PageCount).await;
    let badges = ScriptedBadges::failing();
    let engine = lib.engine().with_badges(badges.clone());

    let outcome = engine.update_progress(lib.user_id, book_id, 100).await.unwrap();
    assert!(outcome.newly_finished);
    assert!(outcome.newly_awarded_badges.is_empty());
    assert_eq!(badges.calls(), 1);

    let saved = lib.store.book_progress(lib.user_id, book_id).await.unwrap();
    assert!(saved.finished_at.is_some());
}

/// Wraps the in-memory store and makes every goal write fail.
#[derive(Clone)]
struct BrokenGoalsStore {
    inner: InMemoryStore,
}

struct BrokenGoalsTransaction {
    inner: Box<dyn ReadingTransaction>,
}

#[async_trait]
impl ReadingStore for BrokenGoalsStore {
    async fn begin(&self) -> PortResult<Box<dyn ReadingTransaction>> {
        Ok(Box::new(BrokenGoalsTransaction { inner: self.inner.begin().await? }))
    }

    async fn list_qualifying_activity(&self, user_id: Uuid) -> PortResult<Vec<DailyActivityRecord>> {
        self.inner.list_qualifying_activity(user_id).await
    }
}

#[async_trait]
impl ReadingTransaction for BrokenGoalsTransaction {
    async fn get_book(&mut self, book_id: Uuid) -> PortResult<Book> {
        self.inner.get_book(book_id).await
    }

    async fn lock_book_progress(&mut self, user_id: Uuid, book_id: Uuid) -> PortResult<BookProgressState> {
        self.inner.lock_book_progress(user_id, book_id).await
    }

    async fn save_book_progress(&mut self, state: &BookProgressState) -> PortResult<()> {
        self.inner.save_book_progress(state).await
    }

    async fn increment_daily_activity(
        &mut self,
        user_id: Uuid,
        day: NaiveDate,
        pages: i32,
        minutes: i32,
    ) -> PortResult<DailyActivityRecord> {
        self.inner.increment_daily_activity(user_id, day, pages, minutes).await
    }

    async fn increment_ledger(
        &mut self,
        daily_activity_id: Uuid,
        pages: i32,
        books_completed: i32,
    ) -> PortResult<ProgressLedgerRecord> {
        self.inner.increment_ledger(daily_activity_id, pages, books_completed).await
    }

    async fn lock_active_goals(&mut self, user_id: Uuid, goal_type: GoalType) -> PortResult<Vec<Goal>> {
        self.inner.lock_active_goals(user_id, goal_type).await
    }

    async fn save_goals(&mut self, _goals: &[Goal]) -> PortResult<()> {
        Err(PortError::Unexpected("goals table is read-only".to_string()))
    }

    async fn commit(self: Box<Self>) -> PortResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> PortResult<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn atomic_mode_rolls_back_everything_when_goals_fail() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(300), ProgressType::PageCount).await;
    lib.add_goal(GoalType::Pages, 1000, 0).await;
    let store = BrokenGoalsStore { inner: lib.store.clone() };
    let engine = ReadingEngine::new(Arc::new(store)).with_clock(lib.clock.clone());

    let err = engine.update_progress(lib.user_id, book_id, 50).await.unwrap_err();
    assert!(matches!(err, EngineError::Aggregation(_)));

    let saved = lib.store.book_progress(lib.user_id, book_id).await.unwrap();
    assert_eq!(saved.progress, 0);
    assert_eq!(lib.today_totals().await, (None, None));
}

#[tokio::test]
async fn best_effort_mode_keeps_the_book_state_and_reports_stale_aggregates() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(300), ProgressType::PageCount).await;
    lib.add_goal(GoalType::Pages, 1000, 0).await;
    let store = BrokenGoalsStore { inner: lib.store.clone() };
    let engine = ReadingEngine::new(Arc::new(store))
        .with_clock(lib.clock.clone())
        .with_consistency(ConsistencyMode::BestEffort);

    let outcome = engine.update_progress(lib.user_id, book_id, 50).await.unwrap();
    assert!(outcome.aggregation_error.is_some());
    assert_eq!(outcome.book_state.progress, 50);

    let saved = lib.store.book_progress(lib.user_id, book_id).await.unwrap();
    assert_eq!(saved.progress, 50);
    // The aggregate transaction was discarded as a whole.
    assert_eq!(lib.today_totals().await, (None, None));
}

#[tokio::test]
async fn best_effort_finish_still_awards_badges_when_aggregates_fail() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(120), ProgressType::PageCount).await;
    let books_goal = lib.add_goal(GoalType::Books, 10, 0).await;
    let badges = ScriptedBadges::granting();
    let store = BrokenGoalsStore { inner: lib.store.clone() };
    let engine = ReadingEngine::new(Arc::new(store))
        .with_clock(lib.clock.clone())
        .with_badges(badges.clone())
        .with_consistency(ConsistencyMode::BestEffort);

    let outcome = engine.update_progress(lib.user_id, book_id, 120).await.unwrap();
    assert!(outcome.aggregation_error.is_some());
    assert!(outcome.newly_finished);
    assert_eq!(outcome.newly_awarded_badges.len(), 1);
    assert_eq!(badges.calls(), 1);

    let saved = lib.store.book_progress(lib.user_id, book_id).await.unwrap();
    assert_eq!(saved.finished_at, Some(start_time()));
    assert_eq!(lib.today_totals().await, (None, None));
    assert_eq!(lib.goal(books_goal).await.progress, 0);
}

//=========================================================================================
// Concurrency
//=========================================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_to_one_book_do_not_double_count() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(300), ProgressType::PageCount).await;
    let engine = Arc::new(lib.engine());

    let handles: Vec<_> = [100, 200]
        .into_iter()
        .map(|value| {
            let engine = engine.clone();
            let user_id = lib.user_id;
            tokio::spawn(async move { engine.update_progress(user_id, book_id, value).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Either order of the two updates reads exactly 200 new pages in total.
    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 200);
    assert_eq!(ledger.unwrap().pages_read, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_books_accumulate_into_one_day() {
    let lib = Library::new();
    let mut books = Vec::new();
    for _ in 0..8 {
        books.push(lib.add_book(Some(100), ProgressType::PageCount).await);
    }
    let engine = Arc::new(lib.engine());

    let handles: Vec<_> = books
        .into_iter()
        .map(|book_id| {
            let engine = engine.clone();
            let user_id = lib.user_id;
            tokio::spawn(async move { engine.update_progress(user_id, book_id, 25).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let (daily, ledger) = lib.today_totals().await;
    assert_eq!(daily.unwrap().pages_read, 200);
    assert_eq!(ledger.unwrap().pages_read, 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_finishes_do_not_lose_goal_increments() {
    let lib = Library::new();
    let mut books = Vec::new();
    for _ in 0..16 {
        books.push(lib.add_book(Some(25), ProgressType::PageCount).await);
    }
    let pages_goal = lib.add_goal(GoalType::Pages, 1000, 0).await;
    let books_goal = lib.add_goal(GoalType::Books, 1000, 0).await;
    let engine = Arc::new(lib.engine());

    let handles: Vec<_> = books
        .into_iter()
        .map(|book_id| {
            let engine = engine.clone();
            let user_id = lib.user_id;
            tokio::spawn(async move { engine.update_progress(user_id, book_id, 25).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().newly_finished);
    }

    assert_eq!(lib.goal(pages_goal).await.progress, 400);
    assert_eq!(lib.goal(books_goal).await.progress, 16);
    let (_, ledger) = lib.today_totals().await;
    let ledger = ledger.unwrap();
    assert_eq!(ledger.pages_read, 400);
    assert_eq!(ledger.books_completed, 16);
}

//=========================================================================================
// Minutes and Streaks
//=========================================================================================

#[tokio::test]
async fn reading_minutes_advance_time_goals() {
    let lib = Library::new();
    let time_goal = lib.add_goal(GoalType::Time, 60, 45).await;
    let engine = lib.engine();

    let daily = engine.record_reading_minutes(lib.user_id, 30).await.unwrap();
    assert_eq!(daily.minutes_read, 30);
    assert_eq!(daily.pages_read, 0);

    let goal = lib.goal(time_goal).await;
    assert_eq!(goal.progress, 60);
    assert!(goal.completed_at.is_some());

    let err = engine.record_reading_minutes(lib.user_id, 0).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidInput(_)));
}

#[tokio::test]
async fn streaks_come_from_daily_activity() {
    let lib = Library::new();
    for (days_ago, pages, minutes) in [(0, 10, 0), (1, 0, 15), (2, 4, 0), (3, 0, 0), (5, 30, 20)] {
        lib.store
            .insert_daily_activity(DailyActivityRecord {
                id: Uuid::new_v4(),
                user_id: lib.user_id,
                day: today() - Duration::days(days_ago),
                minutes_read: minutes,
                pages_read: pages,
            })
            .await;
    }
    let engine = lib.engine();

    let stats = engine.get_streak_stats(lib.user_id).await.unwrap();
    assert_eq!(stats.current_streak, 3);
    assert_eq!(stats.longest_streak, 3);

    let nobody = engine.get_streak_stats(Uuid::new_v4()).await.unwrap();
    assert_eq!((nobody.current_streak, nobody.longest_streak), (0, 0));
}

#[tokio::test]
async fn streak_counts_from_yesterday_when_today_is_empty() {
    let lib = Library::new();
    let book_id = lib.add_book(Some(500), ProgressType::PageCount).await;
    let engine = lib.engine();

    engine.update_progress(lib.user_id, book_id, 10).await.unwrap();
    lib.clock.advance(Duration::days(1));
    engine.update_progress(lib.user_id, book_id, 20).await.unwrap();
    lib.clock.advance(Duration::days(1));

    let stats = engine.get_streak_stats(lib.user_id).await.unwrap();
    assert_eq!(stats.current_streak, 2);
    assert_eq!(stats.longest_streak, 2);
}
