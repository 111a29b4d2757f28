//! Published-version feed.
//!
//! Fetches the product-details document mapping channels to their
//! currently-published version string, with a short-TTL in-process
//! cache so grouping and the beta plausibility check don't hammer the
//! endpoint.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::UpstreamConfig;

/// Version feed errors
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed version document: {0}")]
    Malformed(String),

    #[error("No published version for channel '{0}'")]
    UnknownChannel(String),
}

/// Client for the published-version document.
pub struct VersionFeed {
    url: String,
    /// channel name -> key in the feed document
    keys: HashMap<String, String>,
    ttl: Duration,
    http: Option<reqwest::Client>,
    cached: Mutex<Option<(Instant, HashMap<String, String>)>>,
}

impl VersionFeed {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build version feed HTTP client")?;

        Ok(Self {
            url: config.version_feed_url.clone(),
            keys: config.version_feed_keys.clone(),
            ttl: Duration::from_secs(config.version_feed_ttl_secs),
            http: Some(http),
            cached: Mutex::new(None),
        })
    }

    /// A feed that always answers from a fixed channel -> version map.
    /// For tests and offline runs; never touches the network.
    pub fn fixed(versions: HashMap<String, String>) -> Self {
        Self {
            url: String::new(),
            keys: HashMap::new(),
            ttl: Duration::from_secs(u64::MAX / 4),
            http: None,
            cached: Mutex::new(Some((Instant::now(), versions))),
        }
    }

    /// Currently-published version string for a channel.
    pub async fn current_version(&self, channel: &str) -> Result<String, FeedError> {
        if let Some(version) = self.cached_version(channel) {
            return Ok(version);
        }

        let http = match &self.http {
            Some(http) => http,
            // fixed feed with no entry for this channel
            None => return Err(FeedError::UnknownChannel(channel.to_string())),
        };

        debug!("Fetching published versions from {}", self.url);
        let response = http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FeedError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FeedError::Network(format!("HTTP {}", response.status())));
        }
        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FeedError::Malformed(e.to_string()))?;

        let mut mapped = HashMap::new();
        for (channel_name, key) in &self.keys {
            if let Some(version) = document.get(key).and_then(|v| v.as_str()) {
                mapped.insert(channel_name.clone(), version.to_string());
            }
        }
        if mapped.is_empty() {
            return Err(FeedError::Malformed(
                "document contains none of the configured channel keys".to_string(),
            ));
        }

        let version = mapped.get(channel).cloned();
        if let Ok(mut cached) = self.cached.lock() {
            *cached = Some((Instant::now(), mapped));
        }
        version.ok_or_else(|| FeedError::UnknownChannel(channel.to_string()))
    }

    fn cached_version(&self, channel: &str) -> Option<String> {
        let cached = self.cached.lock().ok()?;
        match cached.as_ref() {
            Some((stored_at, versions)) if stored_at.elapsed() < self.ttl => {
                versions.get(channel).cloned()
            }
            _ => None,
        }
    }
}
