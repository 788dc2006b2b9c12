use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::adapters::sources::MAX_BATCH_SIZE;
use crate::domain::models::config::Config;

/// Project-local directory holding configuration and, by default, the database.
pub const CONFIG_DIR: &str = ".agent-cache";

/// Prefix for environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "AGENT_CACHE_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid ttl_secs: {0}. Must be at least 1")]
    InvalidTtl(u64),

    #[error("Invalid max_entries: {0}. Must be at least 1")]
    InvalidMaxEntries(u64),

    #[error("Storage path cannot be empty")]
    EmptyStoragePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid sync_interval_ms: {0}. Must be at least 1")]
    InvalidSyncInterval(u64),

    #[error("Invalid failure_threshold: {0}. Must be at least 1")]
    InvalidFailureThreshold(u32),

    #[error("Invalid batch_size {size} for source '{source_name}'. Must be between 1 and {max}", max = MAX_BATCH_SIZE)]
    InvalidBatchSize { source_name: String, size: u32 },

    #[error("Source name cannot be empty")]
    EmptySourceName,

    #[error("Duplicate source name: {0}")]
    DuplicateSourceName(String),

    #[error("Source '{0}' base_url cannot be empty")]
    EmptyBaseUrl(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .agent-cache/config.yaml
    /// 3. .agent-cache/local.yaml (optional local overrides)
    /// 4. Environment variables (AGENT_CACHE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(Path::new(CONFIG_DIR).join("config.yaml")))
            .merge(Yaml::file(Path::new(CONFIG_DIR).join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load from an explicit path when given, otherwise from the project directory
    pub fn load_with_override(path: Option<&Path>) -> Result<Config> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load(),
        }
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let cache = &config.cache;
        if cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidTtl(cache.ttl_secs));
        }
        if cache.max_entries == 0 {
            return Err(ConfigError::InvalidMaxEntries(cache.max_entries));
        }
        if cache.storage_path.trim().is_empty() {
            return Err(ConfigError::EmptyStoragePath);
        }
        if cache.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(cache.max_connections));
        }

        let sync = &config.sync;
        if sync.sync_interval_ms == 0 {
            return Err(ConfigError::InvalidSyncInterval(sync.sync_interval_ms));
        }
        if sync.failure_threshold == 0 {
            return Err(ConfigError::InvalidFailureThreshold(sync.failure_threshold));
        }

        let mut names = HashSet::new();
        for source in &config.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::EmptySourceName);
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::DuplicateSourceName(source.name.clone()));
            }
            if source.base_url.trim().is_empty() {
                return Err(ConfigError::EmptyBaseUrl(source.name.clone()));
            }
            if let Some(size) = source.batch_size {
                if size == 0 || size > MAX_BATCH_SIZE {
                    return Err(ConfigError::InvalidBatchSize {
                        source_name: source.name.clone(),
                        size,
                    });
                }
            }
        }

        let logging = &config.logging;
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(logging.rotation.clone()));
        }

        Ok(())
    }
}
