use chrono::{DateTime, Local};
use clap::Subcommand;
use focustally_core::{codec, Config, RecordOutcome, SessionRequest};

use super::{open_engine, print_json};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Record a completed session
    Record {
        /// Topic ID
        #[arg(long)]
        topic: String,
        /// Duration in minutes
        #[arg(long, conflicts_with = "masked")]
        minutes: Option<f64>,
        /// Masked duration in milliseconds, as sent by a client
        #[arg(long)]
        masked: Option<String>,
        /// Seed the masked duration was produced with, defaults to the shared seed
        #[arg(long)]
        seed: Option<String>,
        /// End time (RFC 3339), defaults to now
        #[arg(long)]
        ended_at: Option<String>,
        /// Session ID used to skip duplicates
        #[arg(long)]
        id: Option<String>,
    },
    /// List recorded sessions
    List {
        /// Only sessions of this topic
        #[arg(long)]
        topic: Option<String>,
    },
}

pub async fn run(action: SessionAction, config: &Config, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;

    match action {
        SessionAction::Record {
            topic,
            minutes,
            masked,
            seed,
            ended_at,
            id,
        } => {
            let (masked, seed) = match (masked, minutes) {
                (Some(masked), _) => {
                    let seed = match seed {
                        Some(seed) => seed,
                        None => engine
                            .seed()?
                            .ok_or("no shared seed stored; pass --seed or run `codec seed --set`")?,
                    };
                    (masked, seed)
                }
                (None, Some(minutes)) => {
                    if !minutes.is_finite() || minutes < 0.0 {
                        return Err(format!("invalid duration: {minutes} minutes").into());
                    }
                    let seed = match seed {
                        Some(seed) => seed,
                        None => engine.ensure_seed()?,
                    };
                    let ms = (minutes * 60_000.0).round() as u64;
                    (codec::mask_duration_ms(ms, &seed), seed)
                }
                (None, None) => return Err("either --minutes or --masked is required".into()),
            };
            let ended_at = match ended_at {
                Some(raw) => DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| format!("invalid --ended-at {raw:?}: {e}"))?
                    .with_timezone(&Local),
                None => Local::now(),
            };

            let mut request = SessionRequest::new(user, topic, masked, seed, ended_at);
            if let Some(id) = id {
                request = request.with_session_id(id);
            }
            let outcome = engine.record_session(request).await;
            print_json(&outcome)?;
            if let RecordOutcome::Recorded { fanout, .. } = &outcome {
                if !fanout.is_complete() {
                    eprintln!("warning: {} effect(s) failed", fanout.failed.len());
                }
            }
        }
        SessionAction::List { topic } => {
            let sessions = engine
                .sessions(user)?
                .into_iter()
                .filter(|s| topic.as_deref().map_or(true, |t| s.topic_id == t))
                .map(|s| {
                    serde_json::json!({
                        "id": s.id,
                        "topicId": s.topic_id,
                        "durationMs": s.duration_ms,
                        "endedAt": s.ended_at.to_rfc3339(),
                    })
                })
                .collect::<Vec<_>>();
            print_json(&sessions)?;
        }
    }
    Ok(())
}
