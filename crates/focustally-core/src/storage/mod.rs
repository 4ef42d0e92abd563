mod config;
pub mod database;
pub mod document;
pub mod memory;
pub mod migrations;
pub mod paths;
pub mod store;

pub use config::{Config, EngineConfig, LoggingConfig, ReportingConfig, StorageConfig, UserConfig};
pub use database::SqliteStore;
pub use document::{field, DocPath, Document, FieldOp, Patch, WriteMode};
pub use memory::MemoryStore;
pub use store::DocumentStore;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/focustally[-dev]/` based on FOCUSTALLY_ENV.
///
/// Set FOCUSTALLY_ENV=dev to use development data directory, or
/// FOCUSTALLY_HOME to use an explicit directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSTALLY_HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home),
        _ => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSTALLY_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focustally-dev")
            } else {
                base_dir.join("focustally")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
