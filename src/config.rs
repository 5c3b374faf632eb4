use crate::cli::Command;
use crate::error::{Error, Result};
use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", global = true)]
    pub config: Option<String>,

    /// Backend base URL
    #[arg(long, env = "API_BASE_URL", global = true)]
    pub base_url: Option<String>,

    /// Delay between status polls, in milliseconds
    #[arg(long, env = "POLL_INTERVAL_MS", global = true)]
    pub poll_interval_ms: Option<u64>,

    /// Consecutive polling failures tolerated before giving up
    #[arg(long, env = "POLL_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub streaming: StreamingConfig,
    pub threads: ThreadsConfig,
    pub assistants: AssistantsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_retries: u32,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StreamingConfig {
    /// Server-side execution timeout sent with every execute request.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThreadsConfig {
    pub search_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantsConfig {
    pub graph_id: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| Error::Config(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Build the layered configuration.
    ///
    /// Priority: CLI flag > CLI env var > `AGENTFLOW_*` env > config file > defaults.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("api.base_url", "http://localhost:2024")?
            .set_default("api.request_timeout_secs", 30)?
            .set_default("polling.interval_ms", 2000)?
            .set_default("polling.max_retries", 3)?
            .set_default("streaming.timeout_secs", 300)?
            .set_default("threads.search_limit", 100)?
            .set_default("assistants.graph_id", "custom_agent")?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path)),
            None => builder.add_source(File::with_name("agentflow").required(false)),
        };

        // E.g. AGENTFLOW_POLLING__INTERVAL_MS=500
        builder = builder.add_source(
            Environment::with_prefix("AGENTFLOW")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // clap has already folded its own env vars into these fields
        if let Some(url) = &cli.base_url {
            builder = builder.set_override("api.base_url", url.as_str())?;
        }
        if let Some(interval) = cli.poll_interval_ms {
            builder = builder
                .set_override("polling.interval_ms", i64::try_from(interval).unwrap_or(i64::MAX))?;
        }
        if let Some(retries) = cli.max_retries {
            builder = builder.set_override("polling.max_retries", i64::from(retries))?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        if cfg.api.base_url.trim().is_empty() {
            return Err(Error::Config("api.base_url cannot be empty".to_string()));
        }
        Ok(cfg)
    }
}
