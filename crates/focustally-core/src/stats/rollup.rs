//! Cross-topic per-user summary (`users/{u}/stats/allTopics`).

use chrono::{Duration, NaiveDate};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::sessions;
use crate::storage::{field, paths, Document, DocumentStore, Patch, WriteMode};

/// The global rollup document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalRollup {
    pub total_focus_ms: u64,
    pub session_count: u64,
    pub avg_daily_focus_ms: f64,
    pub avg_daily_focus_last_updated: Option<NaiveDate>,
    pub peak_focus_session: Option<u64>,
    pub focus_streak: u32,
    pub focus_streak_at: Option<NaiveDate>,
    pub updated_at: Option<NaiveDate>,
}

impl GlobalRollup {
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(serde_json::from_value(Value::Object(doc.clone()))?)
    }
}

pub(crate) fn day_key(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

/// Current rollup, defaults when none has been written yet.
pub fn load_rollup<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<GlobalRollup> {
    match store.get(&paths::rollup(user_id)?)? {
        Some(doc) => GlobalRollup::from_document(&doc),
        None => Ok(GlobalRollup::default()),
    }
}

/// Add a session to the running total and mark the user active today.
pub fn add_total_focus<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    duration_ms: u64,
    today: NaiveDate,
) -> Result<()> {
    let by = i64::try_from(duration_ms).unwrap_or(i64::MAX);
    let patch = Patch::new()
        .increment("totalFocusMs", by)
        .increment("sessionCount", 1)
        .set("updatedAt", day_key(today));
    store.set(&paths::rollup(user_id)?, &patch, WriteMode::Merge)?;
    Ok(())
}

fn stored_peak(doc: Option<&Document>) -> Option<u64> {
    doc.and_then(|d| field(d, "peakFocusSession"))
        .and_then(Value::as_u64)
        .filter(|peak| *peak > 0)
}

/// Raise the peak single-session duration to `duration_ms` if it is longer.
///
/// A missing peak is backfilled once from the full session log. Returns the
/// peak after the update.
pub fn update_peak<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    duration_ms: u64,
) -> Result<u64> {
    let path = paths::rollup(user_id)?;
    let backfill = match stored_peak(store.get(&path)?.as_ref()) {
        Some(_) => None,
        None => Some(sessions::peak_duration(store, user_id)?),
    };

    let mut peak = duration_ms;
    store.transaction(&path, &mut |doc| {
        let current = stored_peak(doc);
        let baseline = current.or(backfill).unwrap_or(0);
        peak = baseline.max(duration_ms);
        if current == Some(peak) {
            return None;
        }
        Some(Patch::new().set("peakFocusSession", peak))
    })?;
    debug!("peak session for {user_id}: {peak} ms");
    Ok(peak)
}

/// Recompute the trailing daily average, at most once per calendar day.
///
/// The window is the `window_days` days ending on `today`. Returns the new
/// average, or `None` when it was already computed today.
pub fn refresh_average<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    today: NaiveDate,
    window_days: u32,
) -> Result<Option<f64>> {
    let rollup = load_rollup(store, user_id)?;
    if rollup.avg_daily_focus_last_updated == Some(today) {
        return Ok(None);
    }

    let from = today - Duration::days(i64::from(window_days.max(1)) - 1);
    let (total_ms, days) = sessions::window_totals(&sessions::load_all(store, user_id)?, from, today);
    let average = if days == 0 {
        0.0
    } else {
        total_ms as f64 / days as f64
    };

    let patch = Patch::new()
        .set("avgDailyFocusMs", average)
        .set("avgDailyFocusLastUpdated", day_key(today));
    store.set(&paths::rollup(user_id)?, &patch, WriteMode::Merge)?;
    debug!("average for {user_id} over {days} active day(s): {average:.0} ms");
    Ok(Some(average))
}
