mod config;
pub mod database;
mod store;

pub use config::{Config, EngineConfig, SessionDefaults};
pub use database::{Database, LedgerEntry, Stats};
pub use store::SqliteStore;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the Focusroom data directory, creating it if needed.
///
/// `FOCUSROOM_DATA_DIR` overrides the location entirely. Otherwise this is
/// `~/.config/focusroom[-dev]/`, with `FOCUSROOM_ENV=dev` selecting the
/// development directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(path) => PathBuf::from(path),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env = std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
