//! Chart-ready views of bucket aggregates.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::buckets::{Granularity, WEEKDAY_LABELS};
use crate::error::Result;
use crate::storage::{field, paths, Document, DocumentStore};

/// Slot labels and per-slot minutes, aligned by index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSeries {
    pub labels: Vec<String>,
    pub data: Vec<u64>,
}

impl StatsSeries {
    /// All-zero series for the bucket containing `date`.
    pub fn empty(granularity: Granularity, date: NaiveDate) -> Self {
        let labels = slot_labels(granularity, date);
        let data = vec![0; labels.len()];
        Self { labels, data }
    }

    /// Build from a bucket document's `data` map.
    pub fn from_bucket(granularity: Granularity, date: NaiveDate, bucket: Option<&Document>) -> Self {
        let slots = bucket.and_then(|doc| field(doc, "data")).and_then(Value::as_object);
        let labels = slot_labels(granularity, date);
        let data = labels
            .iter()
            .map(|label| slots.and_then(|s| s.get(label)).map(minutes_of).unwrap_or(0))
            .collect();
        Self { labels, data }
    }

    pub fn total_minutes(&self) -> u64 {
        self.data.iter().sum()
    }

    /// Values rendered as `H.MM` hour strings.
    pub fn hour_labels(&self) -> Vec<String> {
        self.data.iter().map(|m| format_hours(*m)).collect()
    }
}

fn minutes_of(value: &Value) -> u64 {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f > 0.0).map(|f| f.floor() as u64))
        .unwrap_or(0)
}

/// `90` -> `"1.30"`.
pub fn format_hours(minutes: u64) -> String {
    format!("{}.{:02}", minutes / 60, minutes % 60)
}

/// Number of days in the month containing `date`.
pub fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = (date.year(), date.month());
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

/// Ordered slot labels for the bucket containing `date`.
pub fn slot_labels(granularity: Granularity, date: NaiveDate) -> Vec<String> {
    match granularity {
        Granularity::Daily => (0..24).map(|h| format!("{h:02}")).collect(),
        Granularity::Weekly => WEEKDAY_LABELS.iter().map(|d| d.to_string()).collect(),
        Granularity::Monthly => (1..=days_in_month(date)).map(|d| format!("{d:02}")).collect(),
        Granularity::Yearly => (1..=12).map(|m| format!("{m:02}")).collect(),
    }
}

/// Read the series for `topic_id` in the bucket containing `date`.
pub fn load_series<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
    granularity: Granularity,
    date: NaiveDate,
) -> Result<StatsSeries> {
    let path = paths::bucket(user_id, granularity, topic_id, &granularity.period_key(date))?;
    let doc = store.get(&path)?;
    Ok(StatsSeries::from_bucket(granularity, date, doc.as_ref()))
}

/// Milliseconds recorded for `date`, read from the monthly bucket.
pub fn day_focus_ms<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
    date: NaiveDate,
) -> Result<u64> {
    let series = load_series(store, user_id, topic_id, Granularity::Monthly, date)?;
    let index = date.day0() as usize;
    Ok(series.data.get(index).copied().unwrap_or(0) * 60_000)
}
