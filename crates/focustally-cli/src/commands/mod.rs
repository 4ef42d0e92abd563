pub mod codec;
pub mod config;
pub mod session;
pub mod stats;
pub mod streak;
pub mod topic;

use chrono::{Local, NaiveDate};
use focustally_core::{Config, FocusEngine, SqliteStore};

/// Engine over the configured SQLite database.
pub fn open_engine(config: &Config) -> Result<FocusEngine<SqliteStore>, Box<dyn std::error::Error>> {
    let path = config.database_path()?;
    log::debug!("opening database at {}", path.display());
    let store = SqliteStore::open(&path)?;
    Ok(FocusEngine::from_config(store, config))
}

/// Parse `YYYY-MM-DD`, defaulting to today.
pub fn parse_date(date: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match date {
        Some(raw) => Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| format!("invalid date {raw:?} (expected YYYY-MM-DD): {e}"))?),
        None => Ok(Local::now().date_naive()),
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
