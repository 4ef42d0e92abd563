use focustally_core::Config;

use super::{open_engine, print_json};

pub async fn run(config: &Config, user: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(config)?;
    let outcome = engine.check_streak(user).await;
    print_json(&outcome)
}
