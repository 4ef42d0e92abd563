//! Structured error reporting.
//!
//! Failures on the degraded paths of the engine are turned into an
//! [`ErrorReport`] and handed to an [`ErrorReporter`]. Reporting itself is
//! best effort: [`ErrorLog::record`] never fails, and after a run of
//! reporter failures its [`CircuitBreaker`] opens and drops further reports
//! until it is reset.

use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const ANONYMOUS: &str = "anonymous";

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    /// Operation that failed, e.g. `recordSession`.
    pub context: String,
    pub user_id: String,
    /// Source chain of the error, outermost first.
    pub stack: Vec<String>,
    pub extra: Value,
    pub time: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: context.into(),
            user_id: ANONYMOUS.to_string(),
            stack: Vec::new(),
            extra: Value::Null,
            time: Utc::now(),
        }
    }

    /// Report for `err`, with its source chain as the stack.
    pub fn from_error(context: impl Into<String>, err: &(dyn StdError + 'static)) -> Self {
        let mut stack = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            stack.push(cause.to_string());
            source = cause.source();
        }
        Self {
            stack,
            ..Self::new(context, err.to_string())
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        if !user_id.is_empty() {
            self.user_id = user_id.to_string();
        }
        self
    }

    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }
}

#[derive(Debug, Error)]
#[error("error report not delivered: {0}")]
pub struct ReportError(pub String);

/// Sink for error reports.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError>;
}

/// Writes reports through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
        error!(
            "[{}] {} (user {}){}{}",
            report.context,
            report.message,
            report.user_id,
            if report.stack.is_empty() {
                String::new()
            } else {
                format!(": {}", report.stack.join(": "))
            },
            if report.extra.is_null() {
                String::new()
            } else {
                format!(" {}", report.extra)
            },
        );
        Ok(())
    }
}

/// Disables reporting after `threshold` consecutive failures.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    failures: AtomicU32,
    open: AtomicBool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
    }

    /// Count a failure. Returns `true` if this failure opened the breaker.
    pub fn record_failure(&self) -> bool {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        failures >= self.threshold && !self.open.swap(true, Ordering::AcqRel)
    }

    /// Close the breaker and clear the failure count.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        self.open.store(false, Ordering::Release);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3)
    }
}

/// A reporter guarded by a circuit breaker.
#[derive(Clone)]
pub struct ErrorLog {
    reporter: Arc<dyn ErrorReporter>,
    breaker: Arc<CircuitBreaker>,
}

impl ErrorLog {
    pub fn new(reporter: Arc<dyn ErrorReporter>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { reporter, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Deliver `report` unless the breaker is open.
    pub fn record(&self, report: ErrorReport) {
        if self.breaker.is_open() {
            return;
        }
        let delivered = catch_unwind(AssertUnwindSafe(|| self.reporter.report(&report)));
        match delivered {
            Ok(Ok(())) => self.breaker.record_success(),
            Ok(Err(e)) => self.on_failure(&e.to_string()),
            Err(_) => self.on_failure("reporter panicked"),
        }
    }

    fn on_failure(&self, reason: &str) {
        if self.breaker.record_failure() {
            warn!("error reporting disabled after repeated failures: {reason}");
        }
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(Arc::new(LogReporter), Arc::new(CircuitBreaker::default()))
    }
}

impl std::fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLog")
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, StoreError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        fail: AtomicBool,
        seen: Mutex<Vec<ErrorReport>>,
        attempts: AtomicU32,
    }

    impl ErrorReporter for Recording {
        fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReportError("sink offline".into()));
            }
            self.seen.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct Panicking;

    impl ErrorReporter for Panicking {
        fn report(&self, _: &ErrorReport) -> Result<(), ReportError> {
            panic!("boom");
        }
    }

    #[test]
    fn report_carries_source_chain() {
        let err = CoreError::Store(StoreError::Unavailable("disk gone".into()));
        let report = ErrorReport::from_error("recordSession", &err).with_user("u1");
        assert_eq!(report.context, "recordSession");
        assert!(report.message.contains("disk gone"));
        assert_eq!(report.user_id, "u1");
        assert_eq!(ErrorReport::new("x", "y").with_user("").user_id, ANONYMOUS);
    }

    #[test]
    fn breaker_opens_after_threshold_and_resets() {
        let sink = Arc::new(Recording::default());
        sink.fail.store(true, Ordering::SeqCst);
        let breaker = Arc::new(CircuitBreaker::new(3));
        let log = ErrorLog::new(sink.clone(), breaker.clone());

        for _ in 0..5 {
            log.record(ErrorReport::new("ctx", "msg"));
        }
        assert!(breaker.is_open());
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);

        breaker.reset();
        sink.fail.store(false, Ordering::SeqCst);
        log.record(ErrorReport::new("ctx", "after reset"));
        assert_eq!(sink.seen.lock().unwrap().len(), 1);
        assert_eq!(breaker.failures(), 0);
    }

    #[test]
    fn success_clears_failure_count() {
        let breaker = CircuitBreaker::new(2);
        assert!(!breaker.record_failure());
        breaker.record_success();
        assert!(!breaker.record_failure());
        assert!(!breaker.is_open());
        assert!(breaker.record_failure());
        assert!(!breaker.record_failure());
    }

    #[test]
    fn panicking_reporter_is_contained() {
        let breaker = Arc::new(CircuitBreaker::new(1));
        let log = ErrorLog::new(Arc::new(Panicking), breaker.clone());
        log.record(ErrorReport::new("ctx", "msg"));
        assert!(breaker.is_open());
    }

    #[test]
    fn log_reporter_never_fails() {
        let report = ErrorReport::new("ctx", "msg").with_extra(serde_json::json!({"k": 1}));
        assert!(LogReporter.report(&report).is_ok());
    }
}
