//! Where each document lives.
//!
//! ```text
//! users/{user}/topics/{topic}                  topic ledger
//! users/{user}/sessions/{session}              session log
//! users/{user}/stats/allTopics                 global rollup
//! users/{user}/{granularity}/{topic}_{period}  bucket aggregate
//! seeds/1                                      shared codec seed
//! ```

use super::document::DocPath;
use crate::error::ValidationError;
use crate::stats::Granularity;

pub const ROLLUP_DOC: &str = "allTopics";
pub const SEED_DOC: &str = "1";

pub fn topics(user_id: &str) -> Result<DocPath, ValidationError> {
    DocPath::new(&["users", user_id, "topics"])
}

pub fn topic(user_id: &str, topic_id: &str) -> Result<DocPath, ValidationError> {
    topics(user_id)?.child(topic_id)
}

pub fn sessions(user_id: &str) -> Result<DocPath, ValidationError> {
    DocPath::new(&["users", user_id, "sessions"])
}

pub fn session(user_id: &str, session_id: &str) -> Result<DocPath, ValidationError> {
    sessions(user_id)?.child(session_id)
}

pub fn rollup(user_id: &str) -> Result<DocPath, ValidationError> {
    DocPath::new(&["users", user_id, "stats", ROLLUP_DOC])
}

pub fn buckets(user_id: &str, granularity: Granularity) -> Result<DocPath, ValidationError> {
    DocPath::new(&["users", user_id, granularity.collection()])
}

pub fn bucket(
    user_id: &str,
    granularity: Granularity,
    topic_id: &str,
    period_key: &str,
) -> Result<DocPath, ValidationError> {
    buckets(user_id, granularity)?.child(&format!("{topic_id}_{period_key}"))
}

pub fn seed() -> Result<DocPath, ValidationError> {
    DocPath::new(&["seeds", SEED_DOC])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        assert_eq!(topic("u1", "t1").unwrap().as_str(), "users/u1/topics/t1");
        assert_eq!(rollup("u1").unwrap().as_str(), "users/u1/stats/allTopics");
        assert_eq!(
            bucket("u1", Granularity::Weekly, "t1", "2025-01-13").unwrap().as_str(),
            "users/u1/weeklyStats/t1_2025-01-13"
        );
        assert_eq!(seed().unwrap().as_str(), "seeds/1");
    }

    #[test]
    fn ids_with_separators_are_rejected() {
        assert!(topic("u1", "a/b").is_err());
        assert!(session("", "s").is_err());
    }
}
