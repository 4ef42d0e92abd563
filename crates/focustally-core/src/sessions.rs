//! Session log.
//!
//! Every accepted session is stored once under its id. The log is the
//! source for full-history scans (peak backfill, trailing average, initial
//! streak) and doubles as the idempotency record for `record_session`.

use std::collections::BTreeSet;

use chrono::{DateTime, Local, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::{paths, DocumentStore, Patch, WriteMode};

/// A completed focus interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(skip)]
    pub id: String,
    pub topic_id: String,
    pub duration_ms: u64,
    pub ended_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Local calendar day the session ended on.
    pub fn local_day(&self) -> NaiveDate {
        self.ended_at.with_timezone(&Local).date_naive()
    }

    fn to_patch(&self) -> Patch {
        Patch::new()
            .set("topicId", self.topic_id.as_str())
            .set("durationMs", self.duration_ms)
            .set("endedAt", self.ended_at.to_rfc3339())
    }
}

/// Store `record` unless a session with the same id already exists.
///
/// Returns `false` for a duplicate.
pub fn claim<S: DocumentStore + ?Sized>(store: &S, user_id: &str, record: &SessionRecord) -> Result<bool> {
    let path = paths::session(user_id, &record.id)?;
    let wrote = store.transaction(&path, &mut |existing| match existing {
        Some(_) => None,
        None => Some(record.to_patch()),
    })?;
    Ok(wrote)
}

/// Store `record`, overwriting any session with the same id.
pub fn write<S: DocumentStore + ?Sized>(store: &S, user_id: &str, record: &SessionRecord) -> Result<()> {
    let path = paths::session(user_id, &record.id)?;
    store.set(&path, &record.to_patch(), WriteMode::Replace)?;
    Ok(())
}

/// Every logged session of the user, ordered by id.
///
/// Documents that do not parse are skipped with a warning.
pub fn load_all<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<Vec<SessionRecord>> {
    let docs = store.list(&paths::sessions(user_id)?)?;
    let mut records = Vec::with_capacity(docs.len());
    for (path, doc) in docs {
        match serde_json::from_value::<SessionRecord>(serde_json::Value::Object(doc)) {
            Ok(mut record) => {
                record.id = path.id().to_string();
                records.push(record);
            }
            Err(e) => warn!("skipping unreadable session {path}: {e}"),
        }
    }
    Ok(records)
}

/// Longest logged session, 0 when there are none.
pub fn peak_duration<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<u64> {
    Ok(load_all(store, user_id)?
        .iter()
        .map(|s| s.duration_ms)
        .max()
        .unwrap_or(0))
}

/// Local days with at least one session.
pub fn active_days<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<BTreeSet<NaiveDate>> {
    Ok(load_all(store, user_id)?
        .iter()
        .map(SessionRecord::local_day)
        .collect())
}

/// Total duration and number of distinct active days in `[from, to]`.
pub fn window_totals(sessions: &[SessionRecord], from: NaiveDate, to: NaiveDate) -> (u64, usize) {
    let mut total_ms = 0u64;
    let mut days = BTreeSet::new();
    for session in sessions {
        let day = session.local_day();
        if day >= from && day <= to {
            total_ms = total_ms.saturating_add(session.duration_ms);
            days.insert(day);
        }
    }
    (total_ms, days.len())
}
