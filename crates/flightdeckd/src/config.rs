//! Configuration for flightdeckd.
//!
//! Loads settings from /etc/flightdeck/config.toml or uses defaults.
//! Every knob the engine consults lives here: store path, upstream
//! endpoints, summarization constants, cache TTLs and the retention
//! horizon.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::catalog::Catalog;

/// Default config file path
pub const CONFIG_PATH: &str = "/etc/flightdeck/config.toml";

/// Sample store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite sample database
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("/var/lib/flightdeck/samples.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Upstream service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Raw sample source (OLAP aggregate endpoint)
    #[serde(default = "default_sample_source_url")]
    pub sample_source_url: String,

    /// Build metadata service (released-build registry)
    #[serde(default = "default_buildhub_url")]
    pub buildhub_url: String,

    /// Published-version feed (channel -> current version document)
    #[serde(default = "default_version_feed_url")]
    pub version_feed_url: String,

    /// Mapping from channel name to the feed document's key for it
    #[serde(default = "default_version_feed_keys")]
    pub version_feed_keys: HashMap<String, String>,

    /// How long a fetched version document stays fresh
    #[serde(default = "default_version_feed_ttl")]
    pub version_feed_ttl_secs: u64,

    /// Per-request timeout for all upstream calls
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_sample_source_url() -> String {
    "https://aggregates.telemetry.example.com/api/error_aggregates".to_string()
}

fn default_buildhub_url() -> String {
    "https://buildhub.example.com/api/builds".to_string()
}

fn default_version_feed_url() -> String {
    "https://product-details.mozilla.org/1.0/firefox_versions.json".to_string()
}

fn default_version_feed_keys() -> HashMap<String, String> {
    [
        ("nightly", "FIREFOX_NIGHTLY"),
        ("esr", "FIREFOX_ESR"),
        ("beta", "LATEST_FIREFOX_DEVEL_VERSION"),
        ("release", "LATEST_FIREFOX_VERSION"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_version_feed_ttl() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            sample_source_url: default_sample_source_url(),
            buildhub_url: default_buildhub_url(),
            version_feed_url: default_version_feed_url(),
            version_feed_keys: default_version_feed_keys(),
            version_feed_ttl_secs: default_version_feed_ttl(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Summarization constants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// How many major versions behind the current one to summarize,
    /// for channels that don't override it in the catalog
    #[serde(default = "default_version_lookback")]
    pub version_lookback: u32,

    /// How many trailing sub-versions of the current major version get
    /// their own record (ignored on continuous-release channels)
    #[serde(default = "default_recent_subversion_count")]
    pub recent_subversion_count: usize,

    /// Quantile of per-sample rates kept when computing the trimmed
    /// rate aggregate
    #[serde(default = "default_trim_quantile")]
    pub trim_quantile: f64,

    /// How long a cached summary stays fresh
    #[serde(default = "default_summary_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum number of cached summaries
    #[serde(default = "default_summary_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_version_lookback() -> u32 {
    3
}

fn default_recent_subversion_count() -> usize {
    3
}

fn default_trim_quantile() -> f64 {
    0.999
}

fn default_summary_cache_ttl() -> u64 {
    24 * 60 * 60
}

fn default_summary_cache_capacity() -> usize {
    256
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            version_lookback: default_version_lookback(),
            recent_subversion_count: default_recent_subversion_count(),
            trim_quantile: default_trim_quantile(),
            cache_ttl_secs: default_summary_cache_ttl(),
            cache_capacity: default_summary_cache_capacity(),
        }
    }
}

/// Sample retention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Samples older than this are eligible for the expiry sweep
    #[serde(default = "default_retention_days")]
    pub days: i64,
}

fn default_retention_days() -> i64 {
    200
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub retention: RetentionConfig,

    /// Full dimension-catalog override; the built-in catalog is used
    /// when absent
    #[serde(default)]
    pub catalog: Option<Catalog>,
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults if
    /// the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// The effective dimension catalog.
    pub fn catalog(&self) -> Catalog {
        self.catalog.clone().unwrap_or_default()
    }
}
