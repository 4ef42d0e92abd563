//! Topic CRUD.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{TopicLedger, LEVELS};
use crate::error::{Result, ValidationError};
use crate::sessions;
use crate::stats::Granularity;
use crate::storage::{field, paths, DocumentStore, Patch, WriteMode};

/// Trim, collapse inner whitespace and capitalise each word.
pub fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn clean_name(name: &str) -> Result<String, ValidationError> {
    let name = title_case(name);
    if name.is_empty() {
        return Err(ValidationError::InvalidValue {
            field: "topic".into(),
            message: "topic name must not be empty".into(),
        });
    }
    Ok(name)
}

/// Create a topic with an empty ledger.
pub fn create_topic<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<TopicLedger> {
    let name = clean_name(name)?;
    let topic_id = Uuid::new_v4().to_string();
    let path = paths::topic(user_id, &topic_id)?;
    let patch = Patch::new()
        .set("topic", name.as_str())
        .set("totalMs", 0)
        .set("sessionCount", 0)
        .set("lastSessionAt", Value::Null)
        .set("level", LEVELS[0].name)
        .set("levelIndex", 0)
        .set("createdAt", now.to_rfc3339())
        .set("updatedAt", now.to_rfc3339());
    store.set(&path, &patch, WriteMode::Replace)?;
    info!("created topic {topic_id} ({name})");

    Ok(TopicLedger {
        topic_id,
        topic_name: name,
        total_ms: 0,
        session_count: 0,
        last_session_at: None,
        level: LEVELS[0].name.to_string(),
        level_index: 0,
        created_at: Some(now),
        updated_at: Some(now),
    })
}

/// Rename an existing topic. Fails with `NotFound` for a missing topic.
pub fn rename_topic<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<String> {
    let name = clean_name(name)?;
    let path = paths::topic(user_id, topic_id)?;
    let patch = Patch::new()
        .set("topic", name.as_str())
        .set("updatedAt", now.to_rfc3339());
    store.update(&path, &patch)?;
    info!("renamed topic {topic_id} to {name}");
    Ok(name)
}

/// Counts of documents removed by [`delete_topic`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub topic: bool,
    pub sessions: usize,
    pub buckets: usize,
}

/// Delete a topic with its sessions and bucket aggregates.
pub fn delete_topic<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
) -> Result<DeleteSummary> {
    let mut summary = DeleteSummary::default();

    let path = paths::topic(user_id, topic_id)?;
    summary.topic = store.get(&path)?.is_some();
    store.delete(&path)?;

    for session in sessions::load_all(store, user_id)? {
        if session.topic_id == topic_id {
            store.delete(&paths::session(user_id, &session.id)?)?;
            summary.sessions += 1;
        }
    }

    for granularity in Granularity::ALL {
        for (path, doc) in store.list(&paths::buckets(user_id, granularity)?)? {
            let owned = field(&doc, "topicId").and_then(Value::as_str) == Some(topic_id);
            if owned {
                store.delete(&path)?;
                summary.buckets += 1;
            }
        }
    }

    debug!("deleted topic {topic_id}: {summary:?}");
    Ok(summary)
}

/// Read one topic ledger.
pub fn load_topic<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    topic_id: &str,
) -> Result<Option<TopicLedger>> {
    match store.get(&paths::topic(user_id, topic_id)?)? {
        Some(doc) => Ok(Some(TopicLedger::from_document(topic_id, doc)?)),
        None => Ok(None),
    }
}

/// All topics of the user ordered by name.
pub fn list_topics<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<Vec<TopicLedger>> {
    let mut topics = store
        .list(&paths::topics(user_id)?)?
        .into_iter()
        .map(|(path, doc)| TopicLedger::from_document(path.id(), doc))
        .collect::<Result<Vec<_>>>()?;
    topics.sort_by(|a, b| a.topic_name.cmp(&b.topic_name));
    Ok(topics)
}

/// Per-topic total hours for a share chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicHours {
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

/// Total hours per topic, rounded to two decimals.
pub fn topic_hours<S: DocumentStore + ?Sized>(store: &S, user_id: &str) -> Result<TopicHours> {
    let mut hours = TopicHours::default();
    for topic in list_topics(store, user_id)? {
        let h = topic.total_ms as f64 / 3_600_000.0;
        hours.labels.push(topic.topic_name);
        hours.data.push((h * 100.0).round() / 100.0);
    }
    Ok(hours)
}
