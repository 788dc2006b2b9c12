//! Command-line front end.

pub mod commands;
pub mod output;
pub mod types;

pub use types::{Cli, Commands};

use crate::domain::models::Config;

/// Run one parsed command against the loaded configuration.
pub async fn dispatch(command: Commands, config: &Config, json_mode: bool) -> anyhow::Result<()> {
    use commands::{agent, cache, sync};

    match command {
        Commands::Get(args) => agent::execute_get(args, config, json_mode).await,
        Commands::List(args) => agent::execute_list(args, config, json_mode).await,
        Commands::Search(args) => agent::execute_search(args, config, json_mode).await,
        Commands::Stats => cache::execute_stats(config, json_mode).await,
        Commands::Evict => cache::execute_evict(config, json_mode).await,
        Commands::Clear => cache::execute_clear(config, json_mode).await,
        Commands::Import(args) => cache::execute_import(args, config, json_mode).await,
        Commands::Sync(args) => sync::execute_sync(args, config, json_mode).await,
        Commands::DemoSync(args) => sync::execute_demo_sync(args, config, json_mode).await,
    }
}

/// Print an error in the requested format and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
