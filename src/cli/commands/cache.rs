//! Cache maintenance commands: stats, evict, clear, import.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use crate::cli::commands::open_query_service;
use crate::cli::output::{format_bytes, output, CommandOutput};
use crate::domain::models::{AgentRecord, CacheStats, Config};
use crate::services::ImportSummary;

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON file holding an array of agent records
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub max_entries: u64,
    pub ttl_secs: u64,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let live: u64 = self.stats.by_chain.values().sum();
        let mut lines = vec![
            "Agent cache:".to_string(),
            format!("  Rows:      {} / {} ({} live, {} expired)", self.stats.total, self.max_entries, live, self.stats.expired_count),
            format!("  TTL:       {}s", self.ttl_secs),
            format!("  Storage:   {}", format_bytes(self.stats.storage_size)),
        ];
        if !self.stats.by_chain.is_empty() {
            lines.push("  By chain:".to_string());
            for (chain, count) in &self.stats.by_chain {
                lines.push(format!("    {:<6} {}", chain.as_str(), count));
            }
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct EvictOutput {
    pub removed: u64,
}

impl CommandOutput for EvictOutput {
    fn to_human(&self) -> String {
        format!("Evicted {} expired agent(s).", self.removed)
    }
}

#[derive(Debug, Serialize)]
pub struct ClearOutput {
    pub cleared: bool,
}

impl CommandOutput for ClearOutput {
    fn to_human(&self) -> String {
        "Agent cache cleared.".to_string()
    }
}

#[derive(Debug, Serialize)]
pub struct ImportOutput {
    pub file: String,
    #[serde(flatten)]
    pub summary: ImportSummary,
}

impl CommandOutput for ImportOutput {
    fn to_human(&self) -> String {
        let mut out = format!("Imported {} agent(s) from {}", self.summary.imported, self.file);
        if self.summary.skipped > 0 {
            out.push_str(&format!(" ({} invalid record(s) skipped)", self.summary.skipped));
        }
        out
    }
}

pub async fn execute_stats(config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    let stats = service.stats().await?;
    output(
        &StatsOutput {
            stats,
            max_entries: config.cache.max_entries,
            ttl_secs: config.cache.ttl_secs,
        },
        json_mode,
    );
    Ok(())
}

pub async fn execute_evict(config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    let removed = service.evict_expired().await?;
    output(&EvictOutput { removed }, json_mode);
    Ok(())
}

pub async fn execute_clear(config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    service.clear().await?;
    output(&ClearOutput { cleared: true }, json_mode);
    Ok(())
}

pub async fn execute_import(args: ImportArgs, config: &Config, json_mode: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let records = parse_records(&raw).with_context(|| format!("Invalid agent records in {}", args.file.display()))?;

    let service = open_query_service(&config.cache).await?;
    let summary = service.import(records).await?;
    output(
        &ImportOutput {
            file: args.file.display().to_string(),
            summary,
        },
        json_mode,
    );
    Ok(())
}

/// Parse a JSON array of records, e.g.
/// `[{"id": "sol:abc", "name": "Alpha", "owner": "...", "quality_score": 71.5}]`.
fn parse_records(raw: &str) -> Result<Vec<AgentRecord>> {
    Ok(serde_json::from_str(raw)?)
}
