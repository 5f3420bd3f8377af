//! Engine configuration loaded from environment variables.
//!
//! Every setting has a default so a node can start with zero configuration.

use std::path::PathBuf;
use std::time::Duration;

use skein_shared::constants::MAX_MESSAGE_SIZE;
use skein_store::database::default_data_dir;

/// Per-fetch deadline during back-propagation, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Thread engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base directory for the SQLite index and the block store.
    /// Env: `SKEIN_DATA_DIR`
    /// Default: the platform data directory.
    pub data_dir: PathBuf,

    /// Deadline for fetching one ancestor block.
    /// Env: `SKEIN_FETCH_TIMEOUT_SECS`
    /// Default: `30`
    pub fetch_timeout: Duration,

    /// Maximum ancestors fetched in one back-propagation walk (0 = unlimited).
    /// Env: `SKEIN_FOLLOW_LIMIT`
    /// Default: `0`
    pub follow_limit: usize,

    /// Largest serialized block accepted, in bytes.
    /// Env: `SKEIN_MAX_BLOCK_SIZE`
    /// Default: 256 KiB
    pub max_block_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().unwrap_or_else(|_| PathBuf::from("./skein")),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            follow_limit: 0,
            max_block_size: MAX_MESSAGE_SIZE,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`EngineConfig::from_env`], reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("SKEIN_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Some(val) = lookup("SKEIN_FETCH_TIMEOUT_SECS") {
            match val.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.fetch_timeout = Duration::from_secs(secs),
                _ => {
                    tracing::warn!(value = %val, "Invalid SKEIN_FETCH_TIMEOUT_SECS, using default");
                }
            }
        }

        if let Some(val) = lookup("SKEIN_FOLLOW_LIMIT") {
            match val.trim().parse::<usize>() {
                Ok(n) => config.follow_limit = n,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid SKEIN_FOLLOW_LIMIT, using default");
                }
            }
        }

        if let Some(val) = lookup("SKEIN_MAX_BLOCK_SIZE") {
            match val.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.max_block_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid SKEIN_MAX_BLOCK_SIZE, using default");
                }
            }
        }

        config
    }
}
