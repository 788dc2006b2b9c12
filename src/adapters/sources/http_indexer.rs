//! Paged HTTP/JSON indexer source.
//!
//! Talks to an indexer exposing two endpoints:
//!
//! - `GET {base}/agents?offset=<n>&limit=<n>[&updated_since=<rfc3339>]`
//!   returning `{ "items": [...], "total"?: n, "has_more"?: bool, "next_cursor"?: s }`
//! - `GET {base}/health`, any 2xx meaning the indexer is up.
//!
//! Cursors handed to the orchestrator are either a decimal record offset or
//! a server page token from `next_cursor`. Tokens are sent back verbatim as
//! `cursor=<token>` in place of `offset`.
//!
//! Items are validated into [`AgentRecord`]s here; invalid items are
//! skipped with a warning rather than failing the batch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentRecord, ChainPrefix, GlobalId, SourceConfig};
use crate::domain::ports::{DataSource, FetchBatch, FetchRequest, DEFAULT_BATCH_SIZE};

/// Upper bound accepted for a configured page size.
pub const MAX_BATCH_SIZE: u32 = 1000;

#[derive(Debug, Deserialize)]
struct AgentsResponse {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    has_more: Option<bool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// One agent as the indexer serializes it. `id` is the chain-local id.
#[derive(Debug, Deserialize)]
struct WireAgent {
    id: String,
    #[serde(default)]
    chain_id: Option<u64>,
    name: String,
    owner: String,
    #[serde(default)]
    trust_tier: Option<u8>,
    #[serde(default)]
    quality_score: Option<f64>,
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PagePosition {
    Offset(u64),
    Token(String),
}

impl PagePosition {
    fn from_cursor(cursor: Option<&str>) -> Self {
        match cursor {
            None => Self::Offset(0),
            Some(c) => c.parse::<u64>().map_or_else(|_| Self::Token(c.to_string()), Self::Offset),
        }
    }

    fn offset(&self) -> Option<u64> {
        match self {
            Self::Offset(offset) => Some(*offset),
            Self::Token(_) => None,
        }
    }
}

/// Data source backed by a paged HTTP indexer.
#[derive(Debug, Clone)]
pub struct HttpIndexerSource {
    name: String,
    chain_prefix: ChainPrefix,
    base_url: String,
    batch_size: u32,
    http: Client,
}

impl HttpIndexerSource {
    pub fn new(
        name: impl Into<String>,
        chain_prefix: ChainPrefix,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> DomainResult<Self> {
        let name = name.into();
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::upstream(&name, format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name,
            chain_prefix,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            http,
        })
    }

    pub fn from_config(config: &SourceConfig) -> DomainResult<Self> {
        let source = Self::new(
            &config.name,
            config.chain_prefix,
            &config.base_url,
            Duration::from_secs(config.timeout_secs),
        )?;
        Ok(match config.batch_size {
            Some(size) => source.with_batch_size(size),
            None => source,
        })
    }

    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_agents(
        &self,
        position: &PagePosition,
        limit: u32,
        request: &FetchRequest,
    ) -> DomainResult<AgentsResponse> {
        let url = format!("{}/agents", self.base_url);
        let mut query = match position {
            PagePosition::Offset(offset) => vec![("offset", offset.to_string())],
            PagePosition::Token(token) => vec![("cursor", token.clone())],
        };
        query.push(("limit", limit.to_string()));
        if let Some(since) = request.updated_since {
            query.push(("updated_since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }

        let resp = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| DomainError::upstream(&self.name, format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(DomainError::upstream(
                &self.name,
                format!("GET /agents returned {status}: {body}"),
            ));
        }

        resp.json::<AgentsResponse>()
            .await
            .map_err(|e| DomainError::upstream(&self.name, format!("invalid response body: {e}")))
    }

    fn to_record(&self, item: serde_json::Value) -> DomainResult<AgentRecord> {
        let wire: WireAgent = serde_json::from_value(item)?;
        let id = GlobalId::new(self.chain_prefix, wire.chain_id, wire.id)?;
        let record = AgentRecord {
            id,
            name: wire.name,
            owner: wire.owner,
            trust_tier: wire.trust_tier,
            quality_score: wire.quality_score,
        };
        record.validate()?;
        Ok(record)
    }
}

/// Decide whether another page may follow.
///
/// An explicit server flag wins; otherwise a known total decides when the
/// page offset is known; otherwise a full page is taken to mean there may be more.
fn resolve_has_more(
    explicit: Option<bool>,
    total: Option<u64>,
    offset: Option<u64>,
    returned: usize,
    limit: u32,
) -> bool {
    if let Some(has_more) = explicit {
        return has_more;
    }
    match (total, offset) {
        (Some(total), Some(offset)) => offset + (returned as u64) < total,
        _ => returned >= limit as usize && returned > 0,
    }
}

/// Cursor for the page after this one. A server token wins; offset paging
/// computes the next offset. Token paging without a new token has nowhere to go.
fn next_cursor(position: &PagePosition, server_cursor: Option<String>, returned: usize) -> Option<String> {
    server_cursor.or_else(|| position.offset().map(|offset| (offset + returned as u64).to_string()))
}

#[async_trait]
impl DataSource for HttpIndexerSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn chain_prefix(&self) -> ChainPrefix {
        self.chain_prefix
    }

    fn default_batch_size(&self) -> u32 {
        self.batch_size
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!(source = %self.name, status = %resp.status(), "health check rejected");
                false
            }
            Err(e) => {
                debug!(source = %self.name, error = %e, "health check failed");
                false
            }
        }
    }

    async fn fetch_batch(&self, request: FetchRequest) -> DomainResult<FetchBatch> {
        let position = PagePosition::from_cursor(request.cursor.as_deref());
        let limit = request.limit.clamp(1, MAX_BATCH_SIZE);
        let response = self.get_agents(&position, limit, &request).await?;

        let returned = response.items.len();
        let mut agents = Vec::with_capacity(returned);
        let mut skipped = 0u32;
        for item in response.items {
            match self.to_record(item) {
                Ok(record) => agents.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(source = %self.name, error = %e, "skipping invalid agent");
                }
            }
        }

        let has_more = resolve_has_more(response.has_more, response.total, position.offset(), returned, limit);
        let cursor = if has_more {
            next_cursor(&position, response.next_cursor, returned)
        } else {
            None
        };

        Ok(FetchBatch {
            agents,
            cursor,
            has_more,
            total: response.total,
            skipped,
        })
    }

    async fn total_count(&self) -> DomainResult<Option<u64>> {
        let response = self
            .get_agents(&PagePosition::Offset(0), 1, &FetchRequest::first_page(1))
            .await?;
        Ok(response.total)
    }
}
