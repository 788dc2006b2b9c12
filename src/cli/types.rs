//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::agent::{GetArgs, ListArgs, SearchArgs};
use crate::cli::commands::cache::ImportArgs;
use crate::cli::commands::sync::{DemoSyncArgs, SyncArgs};

#[derive(Parser, Debug)]
#[command(name = "agent-cache")]
#[command(about = "Agent Cache - local, searchable cache of on-chain agent metadata", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to use instead of .agent-cache/config.yaml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up one agent by global id
    Get(GetArgs),

    /// List cached agents, best quality score first
    List(ListArgs),

    /// Full-text search over agent names
    Search(SearchArgs),

    /// Show cache size and per-chain counts
    Stats,

    /// Delete expired agents
    Evict,

    /// Remove every cached agent
    Clear,

    /// Upsert agent records from a JSON file
    Import(ImportArgs),

    /// Sync from the configured indexer sources
    Sync(SyncArgs),

    /// Run one sync pass against built-in synthetic sources
    DemoSync(DemoSyncArgs),
}
