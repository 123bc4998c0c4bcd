//! Runtime configuration read from the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DB_URL_VAR: &str = "QUEST_DB_URL";
pub const GUEST_DIR_VAR: &str = "QUEST_GUEST_DIR";
pub const STORE_TIMEOUT_VAR: &str = "QUEST_STORE_TIMEOUT_MS";

pub const DEFAULT_DB_URL: &str = "sqlite:quest.sqlite3";
pub const DEFAULT_GUEST_DIR: &str = ".quest-guest";
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Where the engine keeps its data and how long a store call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub database_url: String,
    pub guest_dir: PathBuf,
    pub store_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DB_URL.to_owned(),
            guest_dir: PathBuf::from(DEFAULT_GUEST_DIR),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Read configuration from the environment, falling back to defaults for
    /// unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but empty or unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as `from_env` with an explicit variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but empty or unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = lookup(DB_URL_VAR) {
            if url.trim().is_empty() {
                return Err(ConfigError::Empty { var: DB_URL_VAR });
            }
            config.database_url = url;
        }

        if let Some(dir) = lookup(GUEST_DIR_VAR) {
            if dir.trim().is_empty() {
                return Err(ConfigError::Empty { var: GUEST_DIR_VAR });
            }
            config.guest_dir = PathBuf::from(dir);
        }

        if let Some(raw) = lookup(STORE_TIMEOUT_VAR) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| ConfigError::Invalid {
                    var: STORE_TIMEOUT_VAR,
                    raw: raw.clone(),
                })?;
            config.store_timeout = Duration::from_millis(millis);
        }

        Ok(config)
    }
}
