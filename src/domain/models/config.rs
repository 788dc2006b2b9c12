use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::agent::ChainPrefix;

/// Main configuration structure for the agent cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Cache store configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Background sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Upstream indexer sources
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Seconds a record stays visible after its last refresh
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Hard cap on stored rows, enforced after every insert
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Path to the `SQLite` database file
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Upper bound on `ttl_secs` (ten years).
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

const fn default_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_max_entries() -> u64 {
    10_000
}

fn default_storage_path() -> String {
    ".agent-cache/agents.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
            storage_path: default_storage_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_TTL_SECS) as i64)
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.storage_path)
    }
}

/// Background sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncConfig {
    /// Period between background sync ticks
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,

    /// Run one sync cycle as soon as the background task starts
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,

    /// Consecutive failures before a source's circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Seconds an open circuit skips its source
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

const fn default_sync_interval_ms() -> u64 {
    5 * 60 * 1000
}

const fn default_true() -> bool {
    true
}

const fn default_failure_threshold() -> u32 {
    3
}

const fn default_cooldown_secs() -> u64 {
    600
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_interval_ms: default_sync_interval_ms(),
            sync_on_startup: default_true(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl SyncConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// An HTTP indexer feeding one chain family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Chain family the source serves
    pub chain_prefix: ChainPrefix,

    /// Indexer base URL
    pub base_url: String,

    /// Page size for incremental fetches; adapter default when absent
    #[serde(default)]
    pub batch_size: Option<u32>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    10
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when absent
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to stdout when writing files
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// File rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: default_true(),
            rotation: default_rotation(),
        }
    }
}
