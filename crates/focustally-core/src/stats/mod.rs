//! Statistics for focustally
//!
//! This module holds the write side of the aggregates (bucket splitting,
//! the global rollup and the streak state machine) and the chart-ready read
//! side.

mod buckets;
mod rollup;
mod series;
mod streak;

pub use buckets::{
    record_buckets, split, week_start, Boundary, BucketDelta, Granularity, WEEKDAY_LABELS,
};

pub use rollup::{add_total_focus, load_rollup, refresh_average, update_peak, GlobalRollup};

pub use series::{day_focus_ms, days_in_month, format_hours, load_series, slot_labels, StatsSeries};

pub use streak::{reconcile, streak_ending_on, StreakOutcome, StreakState, StreakTransition};
