//! Agent lookup commands: get, list, search.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::cli::commands::{open_query_service, parse_chain_prefix};
use crate::cli::output::table::TableFormatter;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::page::DEFAULT_LIMIT;
use crate::domain::models::{CachedAgent, ChainPrefix, Config, Page, PageRequest, SearchFilter};

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Global id, e.g. `sol:<address>` or `evm:8453:42`
    pub global_id: String,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only agents on this chain family (sol, evm, sui, aptos, near)
    #[arg(short, long, value_parser = parse_chain_prefix)]
    pub chain: Option<ChainPrefix>,

    /// Page size (1-100)
    #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
    pub limit: u32,

    /// Rows to skip
    #[arg(short, long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Free-text query over agent names
    pub query: String,

    /// Only agents on this chain family (sol, evm, sui, aptos, near)
    #[arg(short, long, value_parser = parse_chain_prefix)]
    pub chain: Option<ChainPrefix>,

    /// Page size (1-100)
    #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
    pub limit: u32,

    /// Rows to skip
    #[arg(short, long, default_value_t = 0)]
    pub offset: u32,
}

#[derive(Debug, Serialize)]
pub struct AgentDetailOutput {
    pub query: String,
    pub agent: Option<CachedAgent>,
}

impl CommandOutput for AgentDetailOutput {
    fn to_human(&self) -> String {
        let Some(agent) = &self.agent else {
            return format!("Agent not found (or expired): {}", self.query);
        };

        let mut lines = vec![
            format!("Global ID:     {}", agent.global_id),
            format!("Chain:         {}", agent.chain_prefix),
            format!("Raw ID:        {}", agent.raw_id),
            format!("Name:          {}", agent.name),
            format!("Owner:         {}", agent.owner),
        ];
        if let Some(tier) = agent.trust_tier {
            lines.push(format!("Trust tier:    {tier}"));
        }
        if let Some(score) = agent.quality_score {
            lines.push(format!("Quality score: {score:.2}"));
        }
        lines.push(format!("Expires at:    {}", agent.expires_at.to_rfc3339()));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct AgentPageOutput {
    #[serde(flatten)]
    pub page: Page<CachedAgent>,
}

impl CommandOutput for AgentPageOutput {
    fn to_human(&self) -> String {
        if self.page.is_empty() {
            return if self.page.total == 0 {
                "No agents found.".to_string()
            } else {
                format!("No agents on this page ({} total).", self.page.total)
            };
        }

        let first = u64::from(self.page.offset) + 1;
        let last = u64::from(self.page.offset) + self.page.len() as u64;
        let mut out = TableFormatter::new().format_agents(&self.page.items);
        out.push_str(&format!("\nShowing {first}-{last} of {}", self.page.total));
        if self.page.has_more {
            out.push_str(&format!(" (next: --offset {last})"));
        }
        out
    }
}

pub async fn execute_get(args: GetArgs, config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    let agent = service.get(&args.global_id).await?;
    output(
        &AgentDetailOutput {
            query: args.global_id,
            agent,
        },
        json_mode,
    );
    Ok(())
}

pub async fn execute_list(args: ListArgs, config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    let page = service
        .list(args.chain, PageRequest::new(args.limit, args.offset))
        .await?;
    output(&AgentPageOutput { page }, json_mode);
    Ok(())
}

pub async fn execute_search(args: SearchArgs, config: &Config, json_mode: bool) -> Result<()> {
    let service = open_query_service(&config.cache).await?;
    let mut filter = SearchFilter::default().with_page(args.limit, args.offset);
    if let Some(chain) = args.chain {
        filter = filter.with_chain(chain);
    }
    let page = service.search(&args.query, filter).await?;
    output(&AgentPageOutput { page }, json_mode);
    Ok(())
}
