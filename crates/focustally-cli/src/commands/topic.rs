use clap::Subcommand;
use focustally_core::Config;

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum TopicAction {
    /// Create a topic
    Create {
        /// Topic name (title-cased)
        name: String,
    },
    /// Rename a topic
    Rename {
        /// Topic ID
        id: String,
        /// New name
        name: String,
    },
    /// Delete a topic with its sessions and statistics
    Delete {
        /// Topic ID
        id: String,
    },
    /// Show one topic ledger
    Get {
        /// Topic ID
        id: String,
    },
    /// List topics
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Total hours per topic
    Hours,
}

pub fn run(action: TopicAction, config: &Config, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;

    match action {
        TopicAction::Create { name } => {
            let topic = engine.create_topic(user, &name)?;
            print_json(&serde_json::json!({
                "id": topic.topic_id,
                "topic": topic.topic_name,
            }))?;
        }
        TopicAction::Rename { id, name } => {
            let name = engine.rename_topic(user, &id, &name)?;
            println!("renamed {id} to {name}");
        }
        TopicAction::Delete { id } => {
            let summary = engine.delete_topic(user, &id)?;
            print_json(&summary)?;
        }
        TopicAction::Get { id } => match engine.topic(user, &id)? {
            Some(topic) => print_json(&with_id(&topic)?)?,
            None => return Err(format!("topic not found: {id}").into()),
        },
        TopicAction::List { json } => {
            let topics = engine.list_topics(user)?;
            if json {
                let rows = topics.iter().map(with_id).collect::<Result<Vec<_>, _>>()?;
                print_json(&rows)?;
            } else if topics.is_empty() {
                println!("No topics.");
            } else {
                for topic in &topics {
                    println!(
                        "{}  {:<24} {:>8.2} h  {:<12} {} session(s)",
                        topic.topic_id,
                        topic.topic_name,
                        topic.total_ms as f64 / 3_600_000.0,
                        topic.level,
                        topic.session_count
                    );
                }
            }
        }
        TopicAction::Hours => {
            print_json(&engine.topic_hours(user)?)?;
        }
    }
    Ok(())
}

/// Ledger JSON with the topic id, which the stored document keeps in its path.
fn with_id(topic: &focustally_core::TopicLedger) -> Result<serde_json::Value, serde_json::Error> {
    let mut value = serde_json::to_value(topic)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("id".into(), topic.topic_id.clone().into());
    }
    Ok(value)
}
