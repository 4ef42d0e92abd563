//! # Focustally Core Library
//!
//! This library aggregates focused-work sessions into per-topic and
//! per-user statistics. It follows a CLI-first layout: every operation is
//! available through the `focustally` binary, which is a thin front-end over
//! this crate.
//!
//! ## Architecture
//!
//! - **Codec**: seeded XOR mask/unmask of the duration value sent by clients,
//!   with the seed shared through the store
//! - **Buckets**: splitting a session across hour and day boundaries into
//!   daily, weekly, monthly and yearly aggregates
//! - **Ledger**: per-topic running totals and skill levels
//! - **Rollup & streak**: cross-topic totals, peak session, trailing daily
//!   average and the consecutive-day streak
//! - **Storage**: a document store trait with in-memory and SQLite backends,
//!   plus TOML configuration
//!
//! ## Key Components
//!
//! - [`FocusEngine`]: decode, dedupe and fan-out entry point
//! - [`DocumentStore`]: storage seam, implemented by [`MemoryStore`] and [`SqliteStore`]
//! - [`Config`]: Application configuration management
//! - [`ErrorLog`]: error reporting guarded by a circuit breaker

pub mod clock;
pub mod codec;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod reporting;
pub mod seeds;
pub mod sessions;
pub mod stats;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{Effect, FanoutReport, FocusEngine, RecordOutcome, SessionRequest, SkipReason};
pub use error::{CodecError, ConfigError, CoreError, StoreError, ValidationError};
pub use ledger::{level_for, Level, TopicLedger, LEVELS};
pub use reporting::{CircuitBreaker, ErrorLog, ErrorReport, ErrorReporter, LogReporter};
pub use sessions::SessionRecord;
pub use stats::{GlobalRollup, Granularity, StatsSeries, StreakOutcome};
pub use storage::{Config, DocumentStore, MemoryStore, SqliteStore};
