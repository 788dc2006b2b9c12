//! Sync commands: pull from configured indexers, or from built-in demo sources.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::{info, warn};

use crate::adapters::sources::{HttpIndexerSource, MockDataSource};
use crate::adapters::sqlite::SqliteAgentCache;
use crate::cli::commands::open_store;
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{ChainPrefix, Config};
use crate::domain::ports::AgentCacheRepository;
use crate::services::{SourceStatus, SyncOrchestrator, SyncOrchestratorConfig, SyncReport};

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Run a single pass and exit instead of syncing until Ctrl-C
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct DemoSyncArgs {
    /// Synthetic agents per chain family
    #[arg(short, long, default_value_t = 50)]
    pub records: usize,

    /// Page size requested from each demo source
    #[arg(short, long, default_value_t = 20)]
    pub batch_size: u32,
}

#[derive(Debug, Serialize)]
pub struct SyncReportOutput {
    #[serde(flatten)]
    pub report: SyncReport,
    pub expired_evicted: u64,
}

impl CommandOutput for SyncReportOutput {
    fn to_human(&self) -> String {
        if self.report.sources.is_empty() {
            return "No data sources registered.".to_string();
        }
        let elapsed = self.report.finished_at - self.report.started_at;
        let mut out = TableFormatter::new().format_sync_report(&self.report.sources);
        out.push_str(&format!(
            "\n{} record(s) synced, {} source failure(s), {} expired row(s) evicted in {} ms",
            self.report.records_synced(),
            self.report.failures(),
            self.expired_evicted,
            elapsed.num_milliseconds()
        ));
        out
    }
}

#[derive(Debug, Serialize)]
pub struct SourceStatusOutput {
    pub sources: Vec<SourceStatus>,
}

impl CommandOutput for SourceStatusOutput {
    fn to_human(&self) -> String {
        TableFormatter::new().format_source_status(&self.sources)
    }
}

async fn run_once(orchestrator: &SyncOrchestrator<SqliteAgentCache>) -> Result<SyncReportOutput> {
    let report = orchestrator.sync_now().await;
    let expired_evicted = orchestrator.cache().evict_expired().await?;
    Ok(SyncReportOutput {
        report,
        expired_evicted,
    })
}

pub async fn execute_sync(args: SyncArgs, config: &Config, json_mode: bool) -> Result<()> {
    if config.sources.is_empty() {
        anyhow::bail!("No sources configured. Add a `sources` list to .agent-cache/config.yaml");
    }

    let cache = open_store(&config.cache).await?;
    let orchestrator = Arc::new(SyncOrchestrator::new(cache, SyncOrchestratorConfig::from(&config.sync)));
    for source_config in &config.sources {
        let source = HttpIndexerSource::from_config(source_config)
            .with_context(|| format!("Failed to set up source '{}'", source_config.name))?;
        orchestrator.register_data_source(Arc::new(source)).await?;
    }

    if args.once {
        let result = run_once(&orchestrator).await?;
        output(&result, json_mode);
        return Ok(());
    }

    let mut handle = orchestrator.start();
    info!(
        sources = config.sources.len(),
        interval_ms = config.sync.sync_interval_ms,
        "background sync running, press Ctrl-C to stop"
    );

    let gave_up = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for Ctrl-C, stopping sync");
            }
            false
        }
        () = handle.finished() => true,
    };
    if !gave_up {
        handle.stop().await;
    }

    output(
        &SourceStatusOutput {
            sources: orchestrator.source_status().await,
        },
        json_mode,
    );
    if gave_up {
        anyhow::bail!("Background sync stopped because the cache store is failing");
    }
    Ok(())
}

/// One pass over scripted in-memory sources, one per chain family, into the configured store.
pub async fn execute_demo_sync(args: DemoSyncArgs, config: &Config, json_mode: bool) -> Result<()> {
    let cache = open_store(&config.cache).await?;
    let orchestrator = SyncOrchestrator::new(cache, SyncOrchestratorConfig::from(&config.sync));

    for chain in ChainPrefix::ALL {
        let source = MockDataSource::with_generated(format!("demo-{chain}"), chain, args.records)?
            .with_batch_size(args.batch_size);
        orchestrator.register_data_source(Arc::new(source)).await?;
    }

    let result = run_once(&orchestrator).await?;
    output(&result, json_mode);
    Ok(())
}
