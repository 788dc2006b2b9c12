//! SQLite database adapters for the agent cache.

pub mod agent_cache_repository;
pub mod connection;
pub mod migrations;

pub use agent_cache_repository::SqliteAgentCache;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CacheConfig;

/// Convert a stored epoch-milliseconds column into a UTC timestamp.
pub fn parse_millis(millis: i64) -> DomainResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| DomainError::Serialization(format!("timestamp out of range: {millis}")))
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Open the configured cache database and bring its schema up to date.
pub async fn open_cache(config: &CacheConfig) -> Result<SqliteAgentCache, DatabaseError> {
    let pool = initialize_database(&config.database_url(), Some(PoolConfig::from(config))).await?;
    Ok(SqliteAgentCache::from_config(pool, config))
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
