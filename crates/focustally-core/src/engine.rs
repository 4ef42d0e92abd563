//! The aggregation engine.
//!
//! [`FocusEngine::record_session`] is the single write entry point. It
//! decodes the masked duration, claims the session id, and then runs every
//! downstream effect concurrently:
//!
//! - topic ledger (transactional)
//! - daily, weekly, monthly and yearly buckets (field increments)
//! - total focus, peak session and trailing average on the rollup
//! - streak reconciliation
//!
//! Effects are independent. A failing effect is reported and listed in the
//! [`FanoutReport`]; its siblings are not rolled back.
//!
//! None of the public async methods return errors. Failures are reported
//! through the engine's [`ErrorLog`] and the caller gets a degraded result.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::codec;
use crate::error::{CoreError, Result, StoreError};
use crate::ledger::{self, DeleteSummary, LedgerUpdate, TopicHours, TopicLedger};
use crate::reporting::{CircuitBreaker, ErrorLog, ErrorReport, LogReporter};
use crate::seeds;
use crate::sessions::{self, SessionRecord};
use crate::stats::{self, Granularity, GlobalRollup, StatsSeries, StreakOutcome};
use crate::storage::{paths, Config, DocumentStore, EngineConfig};

/// A completed session as submitted by a client.
#[derive(Clone)]
pub struct SessionRequest {
    pub user_id: String,
    pub topic_id: String,
    /// Duration in milliseconds, masked with `seed`.
    pub masked_duration: String,
    pub seed: String,
    pub ended_at: DateTime<Local>,
    /// Idempotency key. A fresh id is generated when absent.
    pub session_id: Option<String>,
}

impl SessionRequest {
    pub fn new<Tz: TimeZone>(
        user_id: impl Into<String>,
        topic_id: impl Into<String>,
        masked_duration: impl Into<String>,
        seed: impl Into<String>,
        ended_at: DateTime<Tz>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            topic_id: topic_id.into(),
            masked_duration: masked_duration.into(),
            seed: seed.into(),
            ended_at: ended_at.with_timezone(&Local),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

impl fmt::Debug for SessionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRequest")
            .field("user_id", &self.user_id)
            .field("topic_id", &self.topic_id)
            .field("masked_duration", &self.masked_duration)
            .field("seed", &"<redacted>")
            .field("ended_at", &self.ended_at)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Why a session produced no writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    ZeroDuration,
    DecodeFailure,
    Duplicate,
    InvalidRequest,
    StoreUnavailable,
}

/// One downstream write of a saved session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effect {
    Ledger,
    Buckets(Granularity),
    TotalFocus,
    Peak,
    Average,
    Streak,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Ledger => f.write_str("ledger"),
            Effect::Buckets(g) => write!(f, "{}Buckets", g.name()),
            Effect::TotalFocus => f.write_str("totalFocus"),
            Effect::Peak => f.write_str("peakSession"),
            Effect::Average => f.write_str("dailyAverage"),
            Effect::Streak => f.write_str("streak"),
        }
    }
}

/// What the fan-out of one session did.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    /// Effects that failed. Their siblings were still applied.
    pub failed: Vec<Effect>,
    /// `false` when the topic does not exist and the ledger was left alone.
    pub topic_found: bool,
    pub bucket_writes: usize,
    pub peak_ms: Option<u64>,
    pub streak: Option<StreakOutcome>,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of [`FocusEngine::record_session`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordOutcome {
    #[serde(rename_all = "camelCase")]
    Recorded {
        session_id: String,
        duration_ms: u64,
        fanout: FanoutReport,
    },
    Skipped(SkipReason),
}

/// Inputs shared by every effect of one session.
struct Job {
    user_id: String,
    record: SessionRecord,
    end: DateTime<Local>,
    now: DateTime<Utc>,
    today: NaiveDate,
    window_days: u32,
}

/// Focus statistics engine over a document store.
pub struct FocusEngine<S: DocumentStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    errors: ErrorLog,
    config: EngineConfig,
}

impl<S: DocumentStore + 'static> FocusEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store: Arc::new(store),
            clock: Arc::new(SystemClock),
            errors: ErrorLog::default(),
            config: EngineConfig::default(),
        }
    }

    /// Engine configured from the application config.
    pub fn from_config(store: S, config: &Config) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.reporting.failure_threshold));
        Self::new(store)
            .with_config(config.engine.clone())
            .with_error_log(ErrorLog::new(Arc::new(LogReporter), breaker))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_error_log(mut self, errors: ErrorLog) -> Self {
        self.errors = errors;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.errors
    }

    fn report(&self, user_id: &str, context: &str, err: &CoreError, extra: serde_json::Value) {
        warn!("{context} failed for {user_id}: {err}");
        self.errors
            .record(ErrorReport::from_error(context, err).with_user(user_id).with_extra(extra));
    }

    /// Run a store operation on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&S) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || f(&store)).await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Unavailable(format!("store task failed: {e}")).into()),
        }
    }

    async fn effect<T, F>(&self, job: &Arc<Job>, effect: Effect, f: F) -> Result<T, Effect>
    where
        F: FnOnce(&S, &Job) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::clone(job);
        self.blocking(move |store| f(store, &shared))
            .await
            .map_err(|err| {
                let extra = json!({
                    "sessionId": job.record.id,
                    "topicId": job.record.topic_id,
                    "durationMs": job.record.duration_ms,
                });
                self.report(&job.user_id, &effect.to_string(), &err, extra);
                effect
            })
    }

    /// Decode a session and fan it out to every aggregate.
    pub async fn record_session(&self, request: SessionRequest) -> RecordOutcome {
        let duration_ms = match codec::unmask_duration_ms(&request.masked_duration, &request.seed) {
            Ok(ms) => ms,
            Err(e) => {
                let extra = json!({
                    "topicId": request.topic_id,
                    "maskedDuration": request.masked_duration,
                });
                self.report(&request.user_id, "decodeDuration", &e.into(), extra);
                return RecordOutcome::Skipped(SkipReason::DecodeFailure);
            }
        };
        if duration_ms == 0 {
            debug!("zero-length session for {}, nothing to record", request.user_id);
            return RecordOutcome::Skipped(SkipReason::ZeroDuration);
        }

        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if let Err(e) = paths::session(&request.user_id, &session_id)
            .and_then(|_| paths::topic(&request.user_id, &request.topic_id))
        {
            self.report(&request.user_id, "recordSession", &e.into(), json!({ "sessionId": session_id }));
            return RecordOutcome::Skipped(SkipReason::InvalidRequest);
        }

        let record = SessionRecord {
            id: session_id.clone(),
            topic_id: request.topic_id.clone(),
            duration_ms,
            ended_at: request.ended_at.with_timezone(&Utc),
        };
        let now = self.clock.now();
        let job = Arc::new(Job {
            user_id: request.user_id.clone(),
            record,
            end: request.ended_at,
            now: now.with_timezone(&Utc),
            today: now.date_naive(),
            window_days: self.config.average_window_days,
        });

        let dedupe = self.config.deduplicate_sessions;
        let log_job = Arc::clone(&job);
        let claimed = self
            .blocking(move |store| {
                if dedupe {
                    sessions::claim(store, &log_job.user_id, &log_job.record)
                } else {
                    sessions::write(store, &log_job.user_id, &log_job.record).map(|()| true)
                }
            })
            .await;
        match claimed {
            Ok(true) => {}
            Ok(false) => {
                info!("session {session_id} already recorded, skipping");
                return RecordOutcome::Skipped(SkipReason::Duplicate);
            }
            Err(e) => {
                self.report(&job.user_id, "recordSession", &e, json!({ "sessionId": session_id }));
                return RecordOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        }

        let fanout = self.fan_out(&job).await;
        info!(
            "recorded session {session_id}: {duration_ms} ms on topic {} ({} effect(s) failed)",
            job.record.topic_id,
            fanout.failed.len()
        );
        RecordOutcome::Recorded {
            session_id,
            duration_ms,
            fanout,
        }
    }

    async fn fan_out(&self, job: &Arc<Job>) -> FanoutReport {
        let (ledger, daily, weekly, monthly, yearly, total, peak, average, streak) = tokio::join!(
            self.effect(job, Effect::Ledger, |s, j| ledger::record_session(
                s,
                &j.user_id,
                &j.record.topic_id,
                j.record.duration_ms,
                j.now,
            )),
            self.effect(job, Effect::Buckets(Granularity::Daily), buckets::<S>(Granularity::Daily)),
            self.effect(job, Effect::Buckets(Granularity::Weekly), buckets::<S>(Granularity::Weekly)),
            self.effect(job, Effect::Buckets(Granularity::Monthly), buckets::<S>(Granularity::Monthly)),
            self.effect(job, Effect::Buckets(Granularity::Yearly), buckets::<S>(Granularity::Yearly)),
            self.effect(job, Effect::TotalFocus, |s, j| stats::add_total_focus(
                s,
                &j.user_id,
                j.record.duration_ms,
                j.today,
            )),
            self.effect(job, Effect::Peak, |s, j| stats::update_peak(s, &j.user_id, j.record.duration_ms)),
            self.effect(job, Effect::Average, |s, j| stats::refresh_average(
                s,
                &j.user_id,
                j.today,
                j.window_days,
            )),
            // Saving a session, backdated or not, is activity today.
            self.effect(job, Effect::Streak, |s, j| stats::reconcile(s, &j.user_id, j.today, true)),
        );

        let mut report = FanoutReport::default();
        match ledger {
            Ok(Some(LedgerUpdate { .. })) => report.topic_found = true,
            Ok(None) => debug!("topic {} missing, ledger skipped", job.record.topic_id),
            Err(effect) => report.failed.push(effect),
        }
        for writes in [daily, weekly, monthly, yearly] {
            match writes {
                Ok(n) => report.bucket_writes += n,
                Err(effect) => report.failed.push(effect),
            }
        }
        if let Err(effect) = total {
            report.failed.push(effect);
        }
        match peak {
            Ok(ms) => report.peak_ms = Some(ms),
            Err(effect) => report.failed.push(effect),
        }
        if let Err(effect) = average {
            report.failed.push(effect);
        }
        match streak {
            Ok(outcome) => report.streak = Some(outcome),
            Err(effect) => report.failed.push(effect),
        }
        report
    }

    async fn series(&self, granularity: Granularity, user_id: &str, topic_id: &str, date: NaiveDate) -> StatsSeries {
        let (user, topic) = (user_id.to_string(), topic_id.to_string());
        match self
            .blocking(move |store| stats::load_series(store, &user, &topic, granularity, date))
            .await
        {
            Ok(series) => series,
            Err(e) => {
                let extra = json!({ "topicId": topic_id, "date": date.to_string() });
                self.report(user_id, &format!("{}Stats", granularity.name()), &e, extra);
                StatsSeries::empty(granularity, date)
            }
        }
    }

    /// Minutes per hour of the day containing `date`.
    pub async fn daily_stats(&self, user_id: &str, topic_id: &str, date: NaiveDate) -> StatsSeries {
        self.series(Granularity::Daily, user_id, topic_id, date).await
    }

    /// Minutes per weekday of the Monday-based week containing `date`.
    pub async fn weekly_stats(&self, user_id: &str, topic_id: &str, date: NaiveDate) -> StatsSeries {
        self.series(Granularity::Weekly, user_id, topic_id, date).await
    }

    /// Minutes per day of the month containing `date`.
    pub async fn monthly_stats(&self, user_id: &str, topic_id: &str, date: NaiveDate) -> StatsSeries {
        self.series(Granularity::Monthly, user_id, topic_id, date).await
    }

    /// Minutes per month of the year containing `date`.
    pub async fn yearly_stats(&self, user_id: &str, topic_id: &str, date: NaiveDate) -> StatsSeries {
        self.series(Granularity::Yearly, user_id, topic_id, date).await
    }

    /// Focus time recorded on `date` for one topic, 0 on failure.
    pub async fn today_focus_ms(&self, user_id: &str, topic_id: &str, date: NaiveDate) -> u64 {
        let (user, topic) = (user_id.to_string(), topic_id.to_string());
        match self
            .blocking(move |store| stats::day_focus_ms(store, &user, &topic, date))
            .await
        {
            Ok(ms) => ms,
            Err(e) => {
                self.report(user_id, "todayFocusMs", &e, json!({ "topicId": topic_id }));
                0
            }
        }
    }

    /// Current rollup, defaults on failure.
    pub async fn rollup(&self, user_id: &str) -> GlobalRollup {
        let user = user_id.to_string();
        match self.blocking(move |store| stats::load_rollup(store, &user)).await {
            Ok(rollup) => rollup,
            Err(e) => {
                self.report(user_id, "rollup", &e, serde_json::Value::Null);
                GlobalRollup::default()
            }
        }
    }

    /// Reconcile the streak without a new session.
    pub async fn check_streak(&self, user_id: &str) -> StreakOutcome {
        let user = user_id.to_string();
        let today = self.clock.today();
        match self
            .blocking(move |store| stats::reconcile(store, &user, today, false))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.report(user_id, "checkStreak", &e, serde_json::Value::Null);
                StreakOutcome::default()
            }
        }
    }

    pub fn create_topic(&self, user_id: &str, name: &str) -> Result<TopicLedger> {
        ledger::create_topic(&*self.store, user_id, name, self.clock.now().with_timezone(&Utc))
    }

    pub fn rename_topic(&self, user_id: &str, topic_id: &str, name: &str) -> Result<String> {
        ledger::rename_topic(
            &*self.store,
            user_id,
            topic_id,
            name,
            self.clock.now().with_timezone(&Utc),
        )
    }

    pub fn delete_topic(&self, user_id: &str, topic_id: &str) -> Result<DeleteSummary> {
        ledger::delete_topic(&*self.store, user_id, topic_id)
    }

    pub fn topic(&self, user_id: &str, topic_id: &str) -> Result<Option<TopicLedger>> {
        ledger::load_topic(&*self.store, user_id, topic_id)
    }

    pub fn list_topics(&self, user_id: &str) -> Result<Vec<TopicLedger>> {
        ledger::list_topics(&*self.store, user_id)
    }

    pub fn topic_hours(&self, user_id: &str) -> Result<TopicHours> {
        ledger::topic_hours(&*self.store, user_id)
    }

    pub fn sessions(&self, user_id: &str) -> Result<Vec<SessionRecord>> {
        sessions::load_all(&*self.store, user_id)
    }

    /// The shared codec seed, if one has been stored.
    pub fn seed(&self) -> Result<Option<String>> {
        seeds::load_seed(&*self.store)
    }

    /// The shared codec seed, generating one on first use.
    pub fn ensure_seed(&self) -> Result<String> {
        seeds::ensure_seed(&*self.store)
    }

    pub fn set_seed(&self, value: &str) -> Result<()> {
        seeds::store_seed(&*self.store, value)
    }
}

fn buckets<S: DocumentStore + ?Sized + 'static>(
    granularity: Granularity,
) -> impl FnOnce(&S, &Job) -> Result<usize> + Send + 'static {
    move |store, job| {
        stats::record_buckets(
            store,
            &job.user_id,
            &job.record.topic_id,
            granularity,
            job.record.duration_ms,
            &job.end,
            job.now,
        )
    }
}
