//! End-to-end tests of session recording through the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use focustally_core::codec::mask_duration_ms;
use focustally_core::reporting::ReportError;
use focustally_core::storage::{DocPath, Document, Patch, WriteMode};
use focustally_core::{
    CircuitBreaker, DocumentStore, Effect, ErrorLog, ErrorReport, ErrorReporter, FixedClock,
    FocusEngine, Granularity, MemoryStore, RecordOutcome, SessionRequest, SkipReason, StoreError,
};

const SEED: &str = "s3cr3t";
const MIN: u64 = 60_000;

fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn request(topic: &str, minutes: u64, end: DateTime<Local>) -> SessionRequest {
    SessionRequest::new("u1", topic, mask_duration_ms(minutes * MIN, SEED), SEED, end)
}

#[derive(Default)]
struct Collected(Mutex<Vec<ErrorReport>>);

impl ErrorReporter for Collected {
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
        self.0.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Memory store that can be taken down, or fail writes to one collection.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
    broken_collection: Option<&'static str>,
}

impl FlakyStore {
    fn check(&self, path: &DocPath) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        if let Some(c) = self.broken_collection {
            if path.as_str().contains(&format!("/{c}/")) {
                return Err(StoreError::Unavailable(format!("{c} offline")));
            }
        }
        Ok(())
    }
}

impl DocumentStore for FlakyStore {
    fn get(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        self.check(path)?;
        self.inner.get(path)
    }

    fn set(&self, path: &DocPath, patch: &Patch, mode: WriteMode) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.set(path, patch, mode)
    }

    fn update(&self, path: &DocPath, patch: &Patch) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.update(path, patch)
    }

    fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.check(path)?;
        self.inner.delete(path)
    }

    fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>, StoreError> {
        self.check(&collection.child("_").map_err(StoreError::from)?)?;
        self.inner.list(collection)
    }

    fn transaction(
        &self,
        path: &DocPath,
        f: &mut dyn FnMut(Option<&Document>) -> Option<Patch>,
    ) -> Result<bool, StoreError> {
        self.check(path)?;
        self.inner.transaction(path, f)
    }
}

fn engine_with<S: DocumentStore + 'static>(store: S, now: DateTime<Local>) -> (FocusEngine<S>, Arc<Collected>) {
    let reports = Arc::new(Collected::default());
    let engine = FocusEngine::new(store)
        .with_clock(Arc::new(FixedClock::new(now)))
        .with_error_log(ErrorLog::new(reports.clone(), Arc::new(CircuitBreaker::new(3))));
    (engine, reports)
}

#[tokio::test]
async fn ninety_minutes_ending_after_midnight() {
    let end = local(2025, 1, 16, 0, 30);
    let (engine, _) = engine_with(MemoryStore::new(), end);
    let topic = engine.create_topic("u1", "reading").unwrap();

    let outcome = engine.record_session(request(&topic.topic_id, 90, end)).await;
    assert!(matches!(outcome, RecordOutcome::Recorded { .. }));

    let new_day = engine.daily_stats("u1", &topic.topic_id, end.date_naive()).await;
    let prev_day = engine
        .daily_stats("u1", &topic.topic_id, NaiveDate::from_ymd_opt(2025, 1, 15).unwrap())
        .await;
    assert_eq!(new_day.data[0], 30);
    assert_eq!(new_day.total_minutes(), 30);
    assert_eq!(prev_day.data[23], 60);
    assert_eq!(prev_day.total_minutes(), 60);

    // Wednesday 15th and Thursday 16th of the same week.
    let week = engine.weekly_stats("u1", &topic.topic_id, end.date_naive()).await;
    assert_eq!(week.data[2], 60);
    assert_eq!(week.data[3], 30);
}

#[tokio::test]
async fn repeated_call_without_session_id_double_counts() {
    let end = local(2025, 2, 3, 10, 0);
    let (engine, _) = engine_with(MemoryStore::new(), end);
    let topic = engine.create_topic("u1", "math").unwrap();

    for _ in 0..2 {
        let outcome = engine.record_session(request(&topic.topic_id, 25, end)).await;
        assert!(matches!(outcome, RecordOutcome::Recorded { .. }));
    }

    let ledger = engine.topic("u1", &topic.topic_id).unwrap().unwrap();
    assert_eq!(ledger.total_ms, 50 * MIN);
    assert_eq!(ledger.session_count, 2);
    let daily = engine.daily_stats("u1", &topic.topic_id, end.date_naive()).await;
    assert_eq!(daily.data[9], 50);
    assert_eq!(engine.rollup("u1").await.total_focus_ms, 50 * MIN);
}

#[tokio::test]
async fn session_id_makes_recording_idempotent() {
    let end = local(2025, 2, 3, 10, 0);
    let (engine, _) = engine_with(MemoryStore::new(), end);
    let topic = engine.create_topic("u1", "math").unwrap();

    let first = engine
        .record_session(request(&topic.topic_id, 25, end).with_session_id("abc"))
        .await;
    let RecordOutcome::Recorded { session_id, .. } = first else {
        panic!("first call was not recorded");
    };
    assert_eq!(session_id, "abc");

    let second = engine
        .record_session(request(&topic.topic_id, 25, end).with_session_id("abc"))
        .await;
    assert_eq!(second, RecordOutcome::Skipped(SkipReason::Duplicate));

    let ledger = engine.topic("u1", &topic.topic_id).unwrap().unwrap();
    assert_eq!(ledger.total_ms, 25 * MIN);
    assert_eq!(engine.sessions("u1").unwrap().len(), 1);
}

#[tokio::test]
async fn decode_failure_is_reported_without_the_seed() {
    let end = local(2025, 2, 3, 10, 0);
    let (engine, reports) = engine_with(MemoryStore::new(), end);
    let masked = mask_duration_ms(25 * MIN, SEED);

    let outcome = engine
        .record_session(SessionRequest::new("u1", "t", masked, "wrong-seed", end))
        .await;
    assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::DecodeFailure));
    assert!(engine.store().is_empty());

    let reports = reports.0.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].context, "decodeDuration");
    assert_eq!(reports[0].user_id, "u1");
    assert!(!serde_json::to_string(&reports[0]).unwrap().contains("wrong-seed"));
}

#[tokio::test]
async fn unavailable_store_degrades_everything() {
    let end = local(2025, 2, 3, 10, 0);
    let store = FlakyStore::default();
    store.down.store(true, Ordering::SeqCst);
    let (engine, reports) = engine_with(store, end);

    let outcome = engine.record_session(request("t", 25, end)).await;
    assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::StoreUnavailable));

    let series = engine.monthly_stats("u1", "t", end.date_naive()).await;
    assert_eq!(series.labels.len(), 28);
    assert_eq!(series.total_minutes(), 0);
    assert_eq!(engine.rollup("u1").await.total_focus_ms, 0);
    assert_eq!(engine.check_streak("u1").await.count, 0);
    assert_eq!(engine.today_focus_ms("u1", "t", end.date_naive()).await, 0);

    assert_eq!(reports.0.lock().unwrap().len(), 5);
    assert!(!engine.error_log().breaker().is_open());
}

#[tokio::test]
async fn failing_effect_does_not_roll_back_siblings() {
    let end = local(2025, 2, 3, 10, 0);
    let store = FlakyStore {
        broken_collection: Some("weeklyStats"),
        ..FlakyStore::default()
    };
    let (engine, reports) = engine_with(store, end);
    let topic = engine.create_topic("u1", "art").unwrap();

    let RecordOutcome::Recorded { fanout, .. } = engine.record_session(request(&topic.topic_id, 40, end)).await
    else {
        panic!("session was not recorded");
    };
    assert_eq!(fanout.failed, vec![Effect::Buckets(Granularity::Weekly)]);
    assert!(fanout.topic_found);

    let daily = engine.daily_stats("u1", &topic.topic_id, end.date_naive()).await;
    assert_eq!(daily.total_minutes(), 40);
    assert_eq!(engine.topic("u1", &topic.topic_id).unwrap().unwrap().total_ms, 40 * MIN);
    assert_eq!(engine.rollup("u1").await.total_focus_ms, 40 * MIN);

    let reports = reports.0.lock().unwrap();
    assert!(reports.iter().any(|r| r.context == "weeklyBuckets"));
}

#[tokio::test]
async fn streak_follows_the_calendar() {
    let day1 = local(2025, 5, 5, 9, 0);
    let clock = Arc::new(FixedClock::new(day1));
    let engine = FocusEngine::new(MemoryStore::new()).with_clock(clock.clone());
    let topic = engine.create_topic("u1", "focus").unwrap();
    let record = |end| request(&topic.topic_id, 30, end);

    let streak_after = |outcome: RecordOutcome| match outcome {
        RecordOutcome::Recorded { fanout, .. } => fanout.streak.map(|s| s.count),
        RecordOutcome::Skipped(_) => None,
    };

    assert_eq!(streak_after(engine.record_session(record(day1)).await), Some(1));

    // Next morning, nothing yet.
    let day2 = day1 + Duration::days(1);
    clock.set(day2);
    let pending = engine.check_streak("u1").await;
    assert_eq!(pending.count, 1);
    assert!(pending.pending_confirmation);

    assert_eq!(streak_after(engine.record_session(record(day2)).await), Some(2));
    assert_eq!(streak_after(engine.record_session(record(day2 + Duration::hours(2))).await), Some(2));

    let day3 = day2 + Duration::days(1);
    clock.set(day3);
    assert_eq!(streak_after(engine.record_session(record(day3)).await), Some(3));

    // Three days off.
    let day6 = day3 + Duration::days(3);
    clock.set(day6);
    let broken = engine.check_streak("u1").await;
    assert_eq!(broken.count, 0);
    assert!(!broken.pending_confirmation);

    assert_eq!(streak_after(engine.record_session(record(day6)).await), Some(1));
    assert_eq!(engine.rollup("u1").await.focus_streak, 1);
}

#[tokio::test]
async fn backdated_session_keeps_the_streak_pending() {
    let day1 = local(2025, 5, 5, 9, 0);
    let clock = Arc::new(FixedClock::new(day1));
    let engine = FocusEngine::new(MemoryStore::new()).with_clock(clock.clone());
    let topic = engine.create_topic("u1", "focus").unwrap();

    engine.record_session(request(&topic.topic_id, 30, day1)).await;

    // Later the same day, a session that ended yesterday evening comes in.
    let saved_at = day1 + Duration::hours(6);
    clock.set(saved_at);
    let yesterday = day1 - Duration::hours(12);
    let outcome = engine.record_session(request(&topic.topic_id, 20, yesterday)).await;
    assert!(matches!(outcome, RecordOutcome::Recorded { .. }));

    let rollup = engine.rollup("u1").await;
    assert_eq!(rollup.updated_at, Some(day1.date_naive()));
    assert_eq!(rollup.focus_streak, 1);

    let ledger = engine.topic("u1", &topic.topic_id).unwrap().unwrap();
    assert_eq!(ledger.last_session_at, Some(saved_at.with_timezone(&Utc)));

    let path = DocPath::parse(&format!("users/u1/dailyStats/{}_2025-05-04", topic.topic_id)).unwrap();
    let bucket = engine.store().get(&path).unwrap().unwrap();
    assert_eq!(bucket["updatedAt"], saved_at.with_timezone(&Utc).to_rfc3339());

    clock.set(day1 + Duration::days(1));
    let next_day = engine.check_streak("u1").await;
    assert_eq!(next_day.count, 1);
    assert!(next_day.pending_confirmation);
}

#[tokio::test]
async fn peak_and_average_across_sessions() {
    let end = local(2025, 7, 1, 18, 0);
    let clock = Arc::new(FixedClock::new(end));
    let engine = FocusEngine::new(MemoryStore::new()).with_clock(clock.clone());
    let topic = engine.create_topic("u1", "piano").unwrap();

    engine.record_session(request(&topic.topic_id, 50, end)).await;
    engine.record_session(request(&topic.topic_id, 20, end + Duration::hours(1))).await;

    let rollup = engine.rollup("u1").await;
    assert_eq!(rollup.peak_focus_session, Some(50 * MIN));
    assert_eq!(rollup.session_count, 2);
    // Average is computed once per day, on the first session.
    assert_eq!(rollup.avg_daily_focus_ms, (50 * MIN) as f64);

    clock.advance(Duration::days(1));
    engine
        .record_session(request(&topic.topic_id, 10, end + Duration::days(1)))
        .await;
    let rollup = engine.rollup("u1").await;
    assert_eq!(rollup.avg_daily_focus_ms, (40 * MIN) as f64);
    assert_eq!(rollup.peak_focus_session, Some(50 * MIN));
}
