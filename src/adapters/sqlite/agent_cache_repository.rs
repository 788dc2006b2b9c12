//! SQLite implementation of the AgentCacheRepository.
//!
//! Rows live in `cached_agents`; names are indexed in the FTS5 table
//! `cached_agents_fts`, whose rowid mirrors the base row's rowid. Every
//! write path updates both tables inside one transaction, so readers never
//! see the index and the table disagree.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AgentRecord, CacheConfig, CacheStats, CachedAgent, ChainPrefix, Page, PageRequest,
    SearchFilter,
};
use crate::domain::ports::AgentCacheRepository;

const AGENT_COLUMNS: &str = "a.global_id, a.chain_prefix, a.raw_id, a.name, a.owner, \
                             a.trust_tier, a.quality_score, a.expires_at";

/// Highest quality first, unscored rows last, id as a stable tiebreak.
const SCORE_ORDER: &str = "a.quality_score IS NULL, a.quality_score DESC, a.global_id ASC";

const UPSERT_SQL: &str = r#"
    INSERT INTO cached_agents
        (global_id, chain_prefix, raw_id, name, name_folded, owner, trust_tier, quality_score, expires_at, touched_seq)
    VALUES
        (?, ?, ?, ?, ?, ?, ?, ?, ?, (SELECT COALESCE(MAX(touched_seq), 0) + 1 FROM cached_agents))
    ON CONFLICT(global_id) DO UPDATE SET
        chain_prefix = excluded.chain_prefix,
        raw_id = excluded.raw_id,
        name = excluded.name,
        name_folded = excluded.name_folded,
        owner = excluded.owner,
        trust_tier = excluded.trust_tier,
        quality_score = excluded.quality_score,
        expires_at = excluded.expires_at,
        touched_seq = excluded.touched_seq
    RETURNING rowid
"#;

/// Persistent, TTL-bounded, capacity-bounded agent store.
#[derive(Clone)]
pub struct SqliteAgentCache {
    pool: SqlitePool,
    ttl: Duration,
    max_entries: u64,
}

impl SqliteAgentCache {
    pub fn new(pool: SqlitePool, ttl: Duration, max_entries: u64) -> Self {
        Self {
            pool,
            ttl,
            max_entries,
        }
    }

    pub fn from_config(pool: SqlitePool, config: &CacheConfig) -> Self {
        Self::new(pool, config.ttl(), config.max_entries)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    /// `now + ttl`, truncated to the millisecond precision stored on disk.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + self.ttl;
        DateTime::from_timestamp_millis(expires_at.timestamp_millis()).unwrap_or(expires_at)
    }

    async fn write_record(
        tx: &mut Transaction<'_, Sqlite>,
        record: &AgentRecord,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let global_id = record.id.to_string();

        let (rowid,): (i64,) = sqlx::query_as(UPSERT_SQL)
            .bind(&global_id)
            .bind(record.chain_prefix().as_str())
            .bind(record.raw_id())
            .bind(&record.name)
            .bind(record.name.to_lowercase())
            .bind(&record.owner)
            .bind(record.trust_tier.map(i64::from))
            .bind(record.quality_score)
            .bind(expires_at.timestamp_millis())
            .fetch_one(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM cached_agents_fts WHERE rowid = ?")
            .bind(rowid)
            .execute(&mut **tx)
            .await?;

        sqlx::query("INSERT INTO cached_agents_fts (rowid, global_id, name) VALUES (?, ?, ?)")
            .bind(rowid)
            .bind(&global_id)
            .bind(&record.name)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// Delete oldest-expiring rows until the table is back at capacity.
    async fn enforce_capacity(&self, tx: &mut Transaction<'_, Sqlite>) -> DomainResult<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM cached_agents")
            .fetch_one(&mut **tx)
            .await?;

        let count = u64::try_from(count).unwrap_or(0);
        if count <= self.max_entries {
            return Ok(0);
        }
        let excess = i64::try_from(count - self.max_entries).unwrap_or(i64::MAX);

        sqlx::query(
            r#"DELETE FROM cached_agents_fts WHERE rowid IN
               (SELECT rowid FROM cached_agents ORDER BY expires_at ASC, touched_seq ASC LIMIT ?)"#,
        )
        .bind(excess)
        .execute(&mut **tx)
        .await?;

        let result = sqlx::query(
            r#"DELETE FROM cached_agents WHERE rowid IN
               (SELECT rowid FROM cached_agents ORDER BY expires_at ASC, touched_seq ASC LIMIT ?)"#,
        )
        .bind(excess)
        .execute(&mut **tx)
        .await?;

        debug!(evicted = result.rows_affected(), max_entries = self.max_entries, "capacity eviction");
        Ok(result.rows_affected())
    }

    async fn search_fts(
        &self,
        expression: &str,
        chain: Option<&str>,
        now: i64,
        page: PageRequest,
    ) -> Result<(Vec<AgentRow>, i64), sqlx::Error> {
        let (total,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM cached_agents_fts
               JOIN cached_agents a ON a.rowid = cached_agents_fts.rowid
               WHERE cached_agents_fts MATCH ?1 AND a.expires_at > ?2
                 AND (?3 IS NULL OR a.chain_prefix = ?3)"#,
        )
        .bind(expression)
        .bind(now)
        .bind(chain)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"SELECT {AGENT_COLUMNS} FROM cached_agents_fts
               JOIN cached_agents a ON a.rowid = cached_agents_fts.rowid
               WHERE cached_agents_fts MATCH ?1 AND a.expires_at > ?2
                 AND (?3 IS NULL OR a.chain_prefix = ?3)
               ORDER BY cached_agents_fts.rank, a.global_id
               LIMIT ?4 OFFSET ?5"#
        );
        let rows: Vec<AgentRow> = sqlx::query_as(&sql)
            .bind(expression)
            .bind(now)
            .bind(chain)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }

    /// Case-insensitive containment over the pre-folded name column.
    async fn search_substring(
        &self,
        needle: &str,
        chain: Option<&str>,
        now: i64,
        page: PageRequest,
    ) -> Result<(Vec<AgentRow>, i64), sqlx::Error> {
        let folded = needle.to_lowercase();
        let (total,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM cached_agents a
               WHERE a.expires_at > ?1 AND (?2 IS NULL OR a.chain_prefix = ?2)
                 AND instr(a.name_folded, ?3) > 0"#,
        )
        .bind(now)
        .bind(chain)
        .bind(&folded)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"SELECT {AGENT_COLUMNS} FROM cached_agents a
               WHERE a.expires_at > ?1 AND (?2 IS NULL OR a.chain_prefix = ?2)
                 AND instr(a.name_folded, ?3) > 0
               ORDER BY {SCORE_ORDER}
               LIMIT ?4 OFFSET ?5"#
        );
        let rows: Vec<AgentRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(chain)
            .bind(&folded)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok((rows, total))
    }
}

#[async_trait]
impl AgentCacheRepository for SqliteAgentCache {
    async fn upsert(&self, record: &AgentRecord) -> DomainResult<CachedAgent> {
        let expires_at = self.expiry_from(Utc::now());

        let mut tx = self.pool.begin().await?;
        Self::write_record(&mut tx, record, expires_at).await?;
        self.enforce_capacity(&mut tx).await?;
        tx.commit().await?;

        Ok(CachedAgent::from_record(record, expires_at))
    }

    async fn upsert_batch(&self, records: &[AgentRecord]) -> DomainResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for record in records {
            let expires_at = self.expiry_from(Utc::now());
            Self::write_record(&mut tx, record, expires_at).await?;
        }
        self.enforce_capacity(&mut tx).await?;
        tx.commit().await?;

        Ok(records.len())
    }

    async fn get(&self, global_id: &str) -> DomainResult<Option<CachedAgent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM cached_agents a WHERE a.global_id = ? AND a.expires_at > ?");
        let row: Option<AgentRow> = sqlx::query_as(&sql)
            .bind(global_id)
            .bind(Utc::now().timestamp_millis())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn search(&self, query: &str, filter: SearchFilter) -> DomainResult<Page<CachedAgent>> {
        let page = filter.page.clamped();
        let Some(expression) = build_match_expression(query) else {
            return Ok(Page::empty(page));
        };

        let chain = filter.chain_prefix.map(|c| c.as_str());
        let now = Utc::now().timestamp_millis();

        let (rows, total) = match self.search_fts(&expression, chain, now, page).await {
            Ok(found) => found,
            Err(err) if is_query_syntax_error(&err) => {
                debug!(query, error = %err, "full-text query rejected, falling back to substring match");
                let needle = substring_needle(query);
                if needle.is_empty() {
                    return Ok(Page::empty(page));
                }
                self.search_substring(&needle, chain, now, page).await?
            }
            Err(err) => return Err(err.into()),
        };

        into_page(rows, total, page)
    }

    async fn list(
        &self,
        chain_prefix: Option<ChainPrefix>,
        page: PageRequest,
    ) -> DomainResult<Page<CachedAgent>> {
        let page = page.clamped();
        let chain = chain_prefix.map(|c| c.as_str());
        let now = Utc::now().timestamp_millis();

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM cached_agents a WHERE a.expires_at > ?1 AND (?2 IS NULL OR a.chain_prefix = ?2)",
        )
        .bind(now)
        .bind(chain)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"SELECT {AGENT_COLUMNS} FROM cached_agents a
               WHERE a.expires_at > ?1 AND (?2 IS NULL OR a.chain_prefix = ?2)
               ORDER BY {SCORE_ORDER}
               LIMIT ?3 OFFSET ?4"#
        );
        let rows: Vec<AgentRow> = sqlx::query_as(&sql)
            .bind(now)
            .bind(chain)
            .bind(i64::from(page.limit))
            .bind(i64::from(page.offset))
            .fetch_all(&self.pool)
            .await?;

        into_page(rows, total, page)
    }

    async fn evict_expired(&self) -> DomainResult<u64> {
        let now = Utc::now().timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"DELETE FROM cached_agents_fts WHERE rowid IN
               (SELECT rowid FROM cached_agents WHERE expires_at <= ?)"#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM cached_agents WHERE expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed, "evicted expired agents");
        }
        Ok(removed)
    }

    async fn stats(&self) -> DomainResult<CacheStats> {
        let now = Utc::now().timestamp_millis();

        let (total, expired): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at <= ? THEN 1 ELSE 0 END), 0) FROM cached_agents",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let chain_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT chain_prefix, COUNT(*) FROM cached_agents WHERE expires_at > ? GROUP BY chain_prefix",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut by_chain = BTreeMap::new();
        for (prefix, count) in chain_rows {
            match prefix.parse::<ChainPrefix>() {
                Ok(prefix) => {
                    by_chain.insert(prefix, u64::try_from(count).unwrap_or(0));
                }
                Err(_) => warn!(prefix = %prefix, "unknown chain prefix in cache"),
            }
        }

        let (storage_size,): (i64,) = sqlx::query_as(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CacheStats {
            total: u64::try_from(total).unwrap_or(0),
            by_chain,
            expired_count: u64::try_from(expired).unwrap_or(0),
            storage_size: u64::try_from(storage_size).unwrap_or(0),
        })
    }

    async fn clear(&self) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cached_agents_fts").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM cached_agents").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Turn user input into an FTS5 MATCH expression.
///
/// Plain words become prefix terms so `foo` matches `FooBar`. Operators,
/// quoted phrases and anything else FTS5 might treat as syntax pass through
/// unchanged; if that makes the expression invalid the caller falls back to
/// a substring match. Returns `None` for blank or quote-only input.
fn build_match_expression(query: &str) -> Option<String> {
    if substring_needle(query).is_empty() {
        return None;
    }

    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| {
            let is_operator = matches!(term, "AND" | "OR" | "NOT" | "NEAR");
            let is_bareword = term.chars().all(|c| c.is_alphanumeric() || c == '_');
            if is_bareword && !is_operator {
                format!("{term}*")
            } else {
                term.to_string()
            }
        })
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Needle for the substring fallback: the query without quote characters.
fn substring_needle(query: &str) -> String {
    query.replace('"', "").trim().to_string()
}

/// Whether SQLite rejected the MATCH expression itself, as opposed to an I/O or schema failure.
fn is_query_syntax_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    let message = db_err.message();
    message.starts_with("fts5:")
        || message.contains("syntax error")
        || message.contains("unterminated string")
        || message.starts_with("no such column")
        || message.contains("unknown special query")
}

fn into_page(rows: Vec<AgentRow>, total: i64, page: PageRequest) -> DomainResult<Page<CachedAgent>> {
    let items = rows
        .into_iter()
        .map(TryInto::try_into)
        .collect::<DomainResult<Vec<CachedAgent>>>()?;
    Ok(Page::new(items, u64::try_from(total).unwrap_or(0), page))
}

#[derive(sqlx::FromRow)]
struct AgentRow {
    global_id: String,
    chain_prefix: String,
    raw_id: String,
    name: String,
    owner: String,
    trust_tier: Option<i64>,
    quality_score: Option<f64>,
    expires_at: i64,
}

impl TryFrom<AgentRow> for CachedAgent {
    type Error = DomainError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let chain_prefix = row
            .chain_prefix
            .parse::<ChainPrefix>()
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        let trust_tier = row
            .trust_tier
            .map(u8::try_from)
            .transpose()
            .map_err(|e| DomainError::Serialization(format!("trust tier out of range: {e}")))?;

        Ok(CachedAgent {
            global_id: row.global_id,
            chain_prefix,
            raw_id: row.raw_id,
            name: row.name,
            owner: row.owner,
            trust_tier,
            quality_score: row.quality_score,
            expires_at: super::parse_millis(row.expires_at)?,
        })
    }
}
