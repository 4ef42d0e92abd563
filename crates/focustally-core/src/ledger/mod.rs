//! Per-topic running totals and skill levels.
//!
//! A ledger is updated exactly once per saved session inside a store
//! transaction, so concurrent saves for the same topic compose.

mod topics;

pub use topics::{
    create_topic, delete_topic, list_topics, load_topic, rename_topic, title_case, topic_hours,
    DeleteSummary, TopicHours,
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::storage::{paths, Document, DocumentStore, Patch};

const HOUR_MS: u64 = 60 * 60 * 1000;

/// A named skill level reached at `threshold_ms` of total focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Level {
    pub name: &'static str,
    pub threshold_ms: u64,
}

const fn level(name: &'static str, hours: u64) -> Level {
    Level {
        name,
        threshold_ms: hours * HOUR_MS,
    }
}

/// Levels in ascending threshold order. The first threshold is zero.
pub const LEVELS: [Level; 14] = [
    level("Beginner", 0),
    level("Novice", 10),
    level("Learner", 30),
    level("Intermediate", 70),
    level("Skilled", 120),
    level("Advanced", 200),
    level("Proficient", 350),
    level("Expert", 500),
    level("Master", 700),
    level("Grandmaster", 900),
    level("Mythic", 1200),
    level("Transcendent", 2000),
    level("Celestial", 5000),
    level("Omniscient", 10000),
];

/// Highest level whose threshold is at most `total_ms`, with its index.
pub fn level_for(total_ms: u64) -> (usize, &'static Level) {
    LEVELS
        .iter()
        .enumerate()
        .rev()
        .find(|(_, level)| level.threshold_ms <= total_ms)
        .unwrap_or((0, &LEVELS[0]))
}

/// The authoritative running-total record for one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicLedger {
    #[serde(skip)]
    pub topic_id: String,
    #[serde(rename = "topic", default)]
    pub topic_name: String,
    #[serde(default)]
    pub total_ms: u64,
    #[serde(default)]
    pub session_count: u64,
    #[serde(default)]
    pub last_session_at: Option<DateTime<Utc>>,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub level_index: usize,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_level() -> String {
    LEVELS[0].name.to_string()
}

impl TopicLedger {
    pub(crate) fn from_document(topic_id: &str, doc: Document) -> Result<Self> {
        let mut ledger: TopicLedger = serde_json::from_value(Value::Object(doc))?;
        ledger.topic_id = topic_id.to_string();
        Ok(ledger)
    }
}

fn number(doc: &Document, key: &str) -> u64 {
    doc.get(key)
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}

/// Add one session to the topic's ledger.
///
/// Returns the updated totals, or `None` when the topic does not exist (the
/// session is then not reflected in any ledger).
pub fn record_session<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
    duration_ms: u64,
    now: DateTime<Utc>,
) -> Result<Option<LedgerUpdate>> {
    let path = paths::topic(user_id, topic_id)?;
    let mut update = None;
    store.transaction(&path, &mut |doc| {
        let doc = doc?;
        let total_ms = number(doc, "totalMs").saturating_add(duration_ms);
        let session_count = number(doc, "sessionCount") + 1;
        let (level_index, level) = level_for(total_ms);
        update = Some(LedgerUpdate {
            total_ms,
            session_count,
            level: level.name,
            level_index,
        });
        Some(
            Patch::new()
                .set("totalMs", total_ms)
                .set("sessionCount", session_count)
                .set("lastSessionAt", now.to_rfc3339())
                .set("level", level.name)
                .set("levelIndex", level_index)
                .set("updatedAt", now.to_rfc3339()),
        )
    })?;

    match &update {
        Some(u) => debug!("topic {topic_id}: total {} ms, level {}", u.total_ms, u.level),
        None => debug!("topic {topic_id} not found, ledger unchanged"),
    }
    Ok(update)
}

/// Totals written by [`record_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerUpdate {
    pub total_ms: u64,
    pub session_count: u64,
    pub level: &'static str,
    pub level_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn level_lookup_at_thresholds() {
        assert_eq!(level_for(0), (0, &LEVELS[0]));
        assert_eq!(level_for(0).1.name, "Beginner");
        assert_eq!(level_for(10 * HOUR_MS).1.name, "Novice");
        assert_eq!(level_for(10 * HOUR_MS).0, 1);
        assert_eq!(level_for(10 * HOUR_MS - 1).1.name, "Beginner");
        assert_eq!(level_for(u64::MAX).1.name, "Omniscient");
        assert_eq!(level_for(u64::MAX).0, 13);
    }

    #[test]
    fn levels_are_ascending() {
        assert_eq!(LEVELS[0].threshold_ms, 0);
        assert!(LEVELS.windows(2).all(|w| w[0].threshold_ms < w[1].threshold_ms));
    }

    #[test]
    fn missing_topic_is_a_no_op() {
        let store = MemoryStore::new();
        let update = record_session(&store, "u", "ghost", 60_000, Utc::now()).unwrap();
        assert!(update.is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn record_accumulates_and_levels_up() {
        let store = MemoryStore::new();
        let topic = create_topic(&store, "u", "rust", Utc::now()).unwrap();
        let now = Utc::now();
        record_session(&store, "u", &topic.topic_id, 9 * HOUR_MS, now).unwrap();
        let update = record_session(&store, "u", &topic.topic_id, HOUR_MS, now)
            .unwrap()
            .unwrap();
        assert_eq!(update.total_ms, 10 * HOUR_MS);
        assert_eq!(update.session_count, 2);
        assert_eq!(update.level, "Novice");

        let ledger = load_topic(&store, "u", &topic.topic_id).unwrap().unwrap();
        assert_eq!(ledger.level_index, 1);
        assert_eq!(ledger.topic_name, "Rust");
        assert!(ledger.last_session_at.is_some());
    }
}
