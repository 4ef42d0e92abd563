//! Calendar bucket splitting and the bucket store adapter.
//!
//! A session is the interval `[end - duration, end)`. The splitter walks it
//! forward, stopping at every hour boundary (daily buckets) or local
//! midnight (weekly, monthly, yearly buckets), and attributes the whole
//! minutes of each chunk to a `(period, slot)` pair:
//!
//! | granularity | step     | period key          | slot key      |
//! |-------------|----------|---------------------|---------------|
//! | daily       | hour     | `YYYY-MM-DD`        | `00`..`23`    |
//! | weekly      | midnight | Monday `YYYY-MM-DD` | `Mon`..`Sun`  |
//! | monthly     | midnight | `YYYY-MM`           | `01`..`31`    |
//! | yearly      | midnight | `YYYY`              | `01`..`12`    |
//!
//! Minutes are floored per chunk, so sub-minute remainders at each boundary
//! are dropped and the total never exceeds the session's whole minutes.

use chrono::{
    DateTime, Datelike, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Utc,
};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{paths, DocumentStore, Patch, WriteMode};

pub const WEEKDAY_LABELS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

const MS_PER_MINUTE: i64 = 60_000;

/// Bucket granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// Where the walker stops between chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    TopOfHour,
    Midnight,
}

struct Strategy {
    boundary: Boundary,
    /// Name of the field holding the period key in the bucket document.
    period_field: &'static str,
    period_key: fn(NaiveDate) -> String,
    slot_key: fn(&NaiveDateTime) -> String,
}

const DAILY: Strategy = Strategy {
    boundary: Boundary::TopOfHour,
    period_field: "date",
    period_key: day_key,
    slot_key: hour_slot,
};

const WEEKLY: Strategy = Strategy {
    boundary: Boundary::Midnight,
    period_field: "weekStart",
    period_key: week_key,
    slot_key: weekday_slot,
};

const MONTHLY: Strategy = Strategy {
    boundary: Boundary::Midnight,
    period_field: "month",
    period_key: month_key,
    slot_key: day_of_month_slot,
};

const YEARLY: Strategy = Strategy {
    boundary: Boundary::Midnight,
    period_field: "year",
    period_key: year_key,
    slot_key: month_slot,
};

fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn week_key(date: NaiveDate) -> String {
    day_key(week_start(date))
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

fn year_key(date: NaiveDate) -> String {
    date.format("%Y").to_string()
}

fn hour_slot(at: &NaiveDateTime) -> String {
    format!("{:02}", at.hour())
}

fn weekday_slot(at: &NaiveDateTime) -> String {
    WEEKDAY_LABELS[at.weekday().num_days_from_monday() as usize].to_string()
}

fn day_of_month_slot(at: &NaiveDateTime) -> String {
    format!("{:02}", at.day())
}

fn month_slot(at: &NaiveDateTime) -> String {
    format!("{:02}", at.month())
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

impl Granularity {
    pub const ALL: [Granularity; 4] = [
        Granularity::Daily,
        Granularity::Weekly,
        Granularity::Monthly,
        Granularity::Yearly,
    ];

    fn strategy(self) -> &'static Strategy {
        match self {
            Granularity::Daily => &DAILY,
            Granularity::Weekly => &WEEKLY,
            Granularity::Monthly => &MONTHLY,
            Granularity::Yearly => &YEARLY,
        }
    }

    /// Store collection holding this granularity's buckets.
    pub fn collection(self) -> &'static str {
        match self {
            Granularity::Daily => "dailyStats",
            Granularity::Weekly => "weeklyStats",
            Granularity::Monthly => "monthlyStats",
            Granularity::Yearly => "yearlyStats",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Yearly => "yearly",
        }
    }

    pub fn boundary(self) -> Boundary {
        self.strategy().boundary
    }

    /// Period key of the bucket containing `date`.
    pub fn period_key(self, date: NaiveDate) -> String {
        (self.strategy().period_key)(date)
    }

    /// Slot key of the local instant `at`.
    pub fn slot_key(self, at: &NaiveDateTime) -> String {
        (self.strategy().slot_key)(at)
    }
}

/// Minutes attributed to one slot of one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDelta {
    pub period_key: String,
    pub slot_key: String,
    pub minutes: u64,
}

fn next_boundary<Tz: TimeZone>(cursor: &DateTime<Tz>, boundary: Boundary) -> DateTime<Tz> {
    let next = match boundary {
        Boundary::TopOfHour => {
            let into_hour = Duration::minutes(i64::from(cursor.minute()))
                + Duration::seconds(i64::from(cursor.second()))
                + Duration::nanoseconds(i64::from(cursor.nanosecond()));
            cursor.clone() - into_hour + Duration::hours(1)
        }
        Boundary::Midnight => {
            let tz = cursor.timezone();
            cursor
                .date_naive()
                .succ_opt()
                .map(|day| day.and_time(NaiveTime::MIN))
                .and_then(|midnight| {
                    // Zones that skip midnight on a DST change start the day at 01:00.
                    tz.from_local_datetime(&midnight)
                        .earliest()
                        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
                })
                .unwrap_or_else(|| cursor.clone() + Duration::days(1))
        }
    };
    if next <= *cursor {
        cursor.clone() + Duration::hours(1)
    } else {
        next
    }
}

/// Split a session ending at `end` into per-slot minute deltas.
///
/// Adjacent chunks that land in the same slot are combined after flooring.
/// Zero-minute chunks are omitted.
pub fn split<Tz: TimeZone>(
    granularity: Granularity,
    duration_ms: u64,
    end: &DateTime<Tz>,
) -> Vec<BucketDelta> {
    let mut deltas: Vec<BucketDelta> = Vec::new();
    let Ok(total_ms) = i64::try_from(duration_ms) else {
        return deltas;
    };
    let Some(mut cursor) = Duration::try_milliseconds(total_ms)
        .and_then(|d| end.clone().checked_sub_signed(d))
    else {
        return deltas;
    };

    let strategy = granularity.strategy();
    let mut remaining = total_ms;
    while remaining > 0 {
        let boundary = next_boundary(&cursor, strategy.boundary);
        let span = (boundary.clone() - cursor.clone()).num_milliseconds();
        let chunk = remaining.min(span);
        let minutes = (chunk / MS_PER_MINUTE) as u64;

        if minutes > 0 {
            let local = cursor.naive_local();
            let period_key = (strategy.period_key)(local.date());
            let slot_key = (strategy.slot_key)(&local);
            match deltas.last_mut() {
                Some(last) if last.period_key == period_key && last.slot_key == slot_key => {
                    last.minutes += minutes;
                }
                _ => deltas.push(BucketDelta {
                    period_key,
                    slot_key,
                    minutes,
                }),
            }
        }

        cursor = boundary;
        remaining -= chunk;
    }
    deltas
}

/// Apply a session's deltas for one granularity as merge-increments.
///
/// Each delta is its own atomic write, so concurrent sessions never lose
/// minutes. `now` stamps `updatedAt`. Returns the number of bucket writes.
pub fn record_buckets<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
    granularity: Granularity,
    duration_ms: u64,
    end: &DateTime<Local>,
    now: DateTime<Utc>,
) -> Result<usize> {
    let strategy = granularity.strategy();
    let deltas = split(granularity, duration_ms, end);
    for delta in &deltas {
        let path = paths::bucket(user_id, granularity, topic_id, &delta.period_key)?;
        let minutes = i64::try_from(delta.minutes).unwrap_or(i64::MAX);
        let patch = Patch::new()
            .set("topicId", topic_id)
            .set(strategy.period_field, delta.period_key.as_str())
            .increment(format!("data.{}", delta.slot_key), minutes)
            .set("updatedAt", now.to_rfc3339());
        store.set(&path, &patch, WriteMode::Merge)?;
        debug!(
            "{} bucket {path} slot {} += {} min",
            granularity.name(),
            delta.slot_key,
            delta.minutes
        );
    }
    Ok(deltas.len())
}
