//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

use std::path::PathBuf;
use std::sync::Arc;

use agent_cache::adapters::sqlite::{open_cache, SqliteAgentCache};
use agent_cache::domain::models::{AgentRecord, CacheConfig};
use tempfile::TempDir;

/// Create a temporary test database
///
/// Returns the path to a SQLite database file in a temporary directory.
pub fn temp_db_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("agents.db");
    (dir, db_path)
}

/// Open a file-backed cache in a fresh temp directory.
///
/// Keep the returned `TempDir` alive for as long as the cache is used.
#[allow(dead_code)]
pub async fn file_backed_cache(ttl_secs: u64, max_entries: u64) -> (TempDir, Arc<SqliteAgentCache>) {
    let (dir, path) = temp_db_path();
    let config = CacheConfig {
        ttl_secs,
        max_entries,
        storage_path: path.display().to_string(),
        ..CacheConfig::default()
    };
    let cache = open_cache(&config).await.expect("Failed to open cache");
    (dir, Arc::new(cache))
}

#[allow(dead_code)]
pub fn record(id: &str, name: &str) -> AgentRecord {
    AgentRecord::new(id.parse().expect("valid global id"), name, "owner")
}

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
#[allow(dead_code)]
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
