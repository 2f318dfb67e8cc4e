use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Endpoints {
    #[serde(default = "default_endpoint_urls")]
    pub urls: Vec<String>,
}

fn default_endpoint_urls() -> Vec<String> {
    vec![
        "https://lcd-cosmoshub.keplr.app".to_string(),
        "https://cosmos-rest.publicnode.com".to_string(),
        "https://rest-cosmoshub.ecostake.com".to_string(),
    ]
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            urls: default_endpoint_urls(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fetch {
    /// Denomination whose balance is reported (base unit)
    #[serde(default = "default_denom")]
    pub denom: String,
    /// Base units per display unit
    #[serde(default = "default_scale_factor")]
    pub scale_factor: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional process-wide request ceiling; unset means unthrottled
    #[serde(default)]
    pub max_requests_per_second: Option<u32>,
}

fn default_denom() -> String {
    "uatom".to_string()
}
fn default_scale_factor() -> u64 {
    1_000_000
}
fn default_request_timeout_ms() -> u64 {
    10_000
}

impl Fetch {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            denom: default_denom(),
            scale_factor: default_scale_factor(),
            request_timeout_ms: default_request_timeout_ms(),
            max_requests_per_second: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Batch {
    /// 3 endpoints * 3 requests per endpoint
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_batch_pause_ms")]
    pub pause_ms: u64,
}

fn default_batch_size() -> usize {
    9
}
fn default_batch_pause_ms() -> u64 {
    1_000
}

impl Batch {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            pause_ms: default_batch_pause_ms(),
        }
    }
}

/// CSV header names for the address columns of the input and output files.
#[derive(Debug, Deserialize, Clone)]
pub struct Columns {
    #[serde(default = "default_source_column")]
    pub source: String,
    #[serde(default = "default_counterpart_column")]
    pub counterpart: String,
}

fn default_source_column() -> String {
    "StargazeAddress".to_string()
}
fn default_counterpart_column() -> String {
    "CosmosAddress".to_string()
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            source: default_source_column(),
            counterpart: default_counterpart_column(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Conversion {
    #[serde(default = "default_source_prefix")]
    pub source_prefix: String,
    #[serde(default = "default_target_prefix")]
    pub target_prefix: String,
}

fn default_source_prefix() -> String {
    "stars".to_string()
}
fn default_target_prefix() -> String {
    "cosmos".to_string()
}

impl Default for Conversion {
    fn default() -> Self {
        Self {
            source_prefix: default_source_prefix(),
            target_prefix: default_target_prefix(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Report {
    /// Balances at or below this (display units) are dust
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: Decimal,
}

fn default_dust_threshold() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

impl Default for Report {
    fn default() -> Self {
        Self {
            dust_threshold: default_dust_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub fetch: Fetch,
    #[serde(default)]
    pub batch: Batch,
    #[serde(default)]
    pub columns: Columns,
    #[serde(default)]
    pub conversion: Conversion,
    #[serde(default)]
    pub report: Report,
}

impl Settings {
    /// Loads `Config.toml` from the working directory if present, then
    /// `XCHAIN_*` environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        Self::load(Config::builder().add_source(File::with_name("Config").required(false)))
    }

    /// Loads settings from an explicit file (must exist), then environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load(Config::builder().add_source(File::from(path)))
    }

    fn load(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        let s = builder
            .add_source(
                Environment::with_prefix("XCHAIN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Endpoint list override accepts a JSON array or a comma-separated list
        if let Ok(raw) = env::var("XCHAIN_ENDPOINT_URLS") {
            if let Some(list) = parse_string_list(&raw) {
                if !list.is_empty() {
                    settings.endpoints.urls = list;
                }
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.size == 0 {
            return Err(ConfigError::Message("batch.size must be at least 1".into()));
        }
        if self.fetch.scale_factor == 0 {
            return Err(ConfigError::Message("fetch.scale_factor must be non-zero".into()));
        }
        if self.fetch.request_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "fetch.request_timeout_ms must be non-zero".into(),
            ));
        }
        if self.fetch.max_requests_per_second == Some(0) {
            return Err(ConfigError::Message(
                "fetch.max_requests_per_second must be non-zero when set".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn parse_string_list(input: &str) -> Option<Vec<String>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(vec![]);
    }

    if trimmed.starts_with('[') {
        if let Ok(v) = serde_json::from_str::<Vec<String>>(trimmed) {
            return Some(v);
        }
        // Bracketed but not valid JSON, e.g. [https://a, https://b]
        let without_brackets = trimmed.trim_start_matches('[').trim_end_matches(']');
        return Some(split_list(without_brackets));
    }

    Some(split_list(trimmed))
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
