#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::adapters::http::DEFAULT_ENDPOINT;
use crate::core::enricher::{DEFAULT_BATCH_PAUSE_MS, MAX_BATCH_SIZE};
use crate::core::retry::{DEFAULT_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS};
use crate::core::table::DEFAULT_PREVIEW_ROWS;
use crate::core::ConfigProvider;
use crate::utils::error::Result;
use crate::utils::validation::{validate_path, validate_range, validate_url, Validate};
use serde::{Deserialize, Serialize};
use toml_config::TomlConfig;

#[cfg(feature = "cli")]
use clap::Parser;

pub const DEFAULT_OUTPUT_PATH: &str = "./output";

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Default, Serialize, Deserialize, Parser)]
#[command(name = "postcode-etl")]
#[command(about = "Normalize UK postcodes, enrich them via a bulk lookup API and export CSV")]
pub struct CliConfig {
    /// Raw postcodes, separated by commas or newlines
    #[arg(long, conflicts_with = "input")]
    pub codes: Option<String>,

    /// Read raw postcodes from a file instead of stdin
    #[arg(short, long)]
    pub input: Option<String>,

    /// TOML config file; explicit flags take precedence over it
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long)]
    pub api_endpoint: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    #[arg(long)]
    pub max_attempts: Option<u32>,

    #[arg(long)]
    pub backoff_ms: Option<u64>,

    #[arg(long)]
    pub batch_pause_ms: Option<u64>,

    /// Rows shown in the terminal preview (the CSV always has every row)
    #[arg(long)]
    pub preview_rows: Option<usize>,

    #[arg(long, help = "Do not print the preview table")]
    pub no_preview: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,
}

/// Effective settings: defaults, then the config file, then explicit flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub api_endpoint: String,
    pub output_path: String,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    pub batch_pause_ms: u64,
    pub preview_rows: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_endpoint: DEFAULT_ENDPOINT.to_string(),
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
            batch_size: MAX_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: DEFAULT_BACKOFF_MS,
            batch_pause_ms: DEFAULT_BATCH_PAUSE_MS,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl Settings {
    pub fn apply_file(mut self, file: &TomlConfig) -> Self {
        if let Some(endpoint) = &file.source.endpoint {
            self.api_endpoint = endpoint.clone();
        }
        if let Some(size) = file.batch.size {
            self.batch_size = size;
        }
        if let Some(pause) = file.batch.pause_ms {
            self.batch_pause_ms = pause;
        }
        if let Some(attempts) = file.retry.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(backoff) = file.retry.backoff_ms {
            self.backoff_ms = backoff;
        }
        if let Some(path) = &file.output.path {
            self.output_path = path.clone();
        }
        if let Some(rows) = file.output.preview_rows {
            self.preview_rows = rows;
        }
        self
    }

    #[cfg(feature = "cli")]
    pub fn apply_cli(mut self, cli: &CliConfig) -> Self {
        if let Some(endpoint) = &cli.api_endpoint {
            self.api_endpoint = endpoint.clone();
        }
        if let Some(path) = &cli.output_path {
            self.output_path = path.clone();
        }
        if let Some(size) = cli.batch_size {
            self.batch_size = size;
        }
        if let Some(attempts) = cli.max_attempts {
            self.max_attempts = attempts;
        }
        if let Some(backoff) = cli.backoff_ms {
            self.backoff_ms = backoff;
        }
        if let Some(pause) = cli.batch_pause_ms {
            self.batch_pause_ms = pause;
        }
        if let Some(rows) = cli.preview_rows {
            self.preview_rows = rows;
        }
        self
    }

    /// Loads `--config` when given and layers the flags on top.
    #[cfg(feature = "cli")]
    pub fn resolve(cli: &CliConfig) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(path) = &cli.config {
            tracing::info!("📁 Loading configuration from: {}", path);
            settings = settings.apply_file(&TomlConfig::from_file(path)?);
        }
        Ok(settings.apply_cli(cli))
    }
}

impl ConfigProvider for Settings {
    fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    fn output_path(&self) -> &str {
        &self.output_path
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn backoff_ms(&self) -> u64 {
        self.backoff_ms
    }

    fn batch_pause_ms(&self) -> u64 {
        self.batch_pause_ms
    }

    fn preview_rows(&self) -> usize {
        self.preview_rows
    }
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validate_url("api_endpoint", &self.api_endpoint)?;
        validate_path("output_path", &self.output_path)?;
        validate_range("batch_size", self.batch_size, 1, MAX_BATCH_SIZE)?;
        validate_range("max_attempts", self.max_attempts, 1, 10)?;
        validate_range("backoff_ms", self.backoff_ms, 0, 60_000)?;
        validate_range("batch_pause_ms", self.batch_pause_ms, 0, 60_000)?;
        Ok(())
    }
}
