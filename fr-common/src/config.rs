//! Bootstrap configuration loading
//!
//! Config file path resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FRIEND_RANK_CONFIG`)
//! 3. Per-user config file (`<config_dir>/friend-rank/config.toml`)
//! 4. Built-in defaults (fallback)
//!
//! A missing config file is not fatal: a warning is logged and the built-in
//! defaults are used. A file that exists but does not parse IS fatal.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "FRIEND_RANK_CONFIG";

/// Bootstrap configuration for the friend-rank service
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind_addr: String,

    /// HTTP server port
    pub port: u16,

    /// Feed pagination settings
    pub feed: FeedConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Feed source and pagination settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// First-page feed endpoint; `access_token` and `limit` are appended
    pub base_url: String,

    /// Records requested per page
    pub page_size: u32,

    /// Maximum number of pages a single job will fetch
    pub depth_limit: u32,

    /// Scheduler tick period in milliseconds
    pub tick_interval_ms: u64,

    /// Per-page fetch timeout in seconds
    pub fetch_timeout_secs: u64,

    /// User-Agent header sent to the feed API
    pub user_agent: String,
}

/// Result cache TTLs and store bounds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for in-progress (partial) snapshots
    pub partial_ttl_secs: u64,

    /// TTL for completed (final) results
    pub final_ttl_secs: u64,

    /// Maximum entries held by the in-process store
    pub max_entries: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5790,
            feed: FeedConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com/me/feed".to_string(),
            page_size: 100,
            depth_limit: 5,
            tick_interval_ms: 100,
            fetch_timeout_secs: 30,
            user_agent: format!("friend-rank/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            partial_ttl_secs: 30,
            final_ttl_secs: 60 * 60,
            max_entries: 10_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FeedConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl CacheConfig {
    pub fn partial_ttl(&self) -> Duration {
        Duration::from_secs(self.partial_ttl_secs)
    }

    pub fn final_ttl(&self) -> Duration {
        Duration::from_secs(self.final_ttl_secs)
    }
}

impl ServiceConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file, falling back to defaults if the file is missing
    pub fn load_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Config file {} not found, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Resolve the config file location and load it
    ///
    /// # Arguments
    /// * `cli_arg` - Path given on the command line, if any
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => Self::load_file(&path),
            None => {
                info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.feed.depth_limit == 0 {
            return Err(Error::Config("feed.depth_limit must be at least 1".to_string()));
        }
        if self.feed.page_size == 0 {
            return Err(Error::Config("feed.page_size must be at least 1".to_string()));
        }
        if self.feed.tick_interval_ms == 0 {
            return Err(Error::Config(
                "feed.tick_interval_ms must be at least 1".to_string(),
            ));
        }
        if self.cache.final_ttl_secs < self.cache.partial_ttl_secs {
            return Err(Error::Config(format!(
                "cache.final_ttl_secs ({}) must not be shorter than cache.partial_ttl_secs ({})",
                self.cache.final_ttl_secs, self.cache.partial_ttl_secs
            )));
        }
        Ok(())
    }
}

/// Config file resolution, highest priority first:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. Per-user config file, if it exists
///
/// Returns `None` when no source names a file, meaning built-in defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Per-user config file
    default_config_path().filter(|path| path.exists())
}

/// Platform config file location (`~/.config/friend-rank/config.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("friend-rank").join("config.toml"))
}
