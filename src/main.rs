//! Agent Cache CLI entry point.

use clap::Parser;

use agent_cache::cli::{dispatch, handle_error, Cli};
use agent_cache::infrastructure::config::ConfigLoader;
use agent_cache::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    let config = match ConfigLoader::load_with_override(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, json_mode),
    };

    let log_config = match LogConfig::try_from(&config.logging) {
        Ok(log_config) => log_config,
        Err(msg) => handle_error(anyhow::anyhow!(msg), json_mode),
    };
    let logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, json_mode),
    };

    let result = dispatch(cli.command, &config, json_mode).await;
    // Flushes the file appender; process::exit would skip it.
    drop(logger);

    if let Err(err) = result {
        handle_error(err, json_mode);
    }
}
