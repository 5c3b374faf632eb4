//! Agentflow command-line client
//!
//! Entry point: loads configuration, installs logging, and dispatches the
//! requested subcommand.

use mimalloc::MiMalloc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use agentflow::Client;
use agentflow::config::{AppConfig, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before clap reads its env fallbacks
    let _ = dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::from_cli(&cli).context("loading configuration")?;
    info!(
        name: "agentflow.config.loaded",
        base_url = %config.api.base_url,
        poll_interval_ms = config.polling.interval_ms,
        max_retries = config.polling.max_retries,
        "Configuration loaded"
    );

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let client = Client::from_config(&config).context("building HTTP client")?;
    agentflow::cli::run(command, &client, &config).await
}

/// Logs go to stderr so command output stays pipeable (M-LOG-STRUCTURED).
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
