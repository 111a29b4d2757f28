//! Build-metadata service client and registry sync.
//!
//! The build-metadata service is the authority on which builds were
//! actually released and with which version string (telemetry's
//! display version is unreliable for pre-release builds). Sync pulls
//! the released (build_id, version) pairs per dimension combination
//! into the local build registry; ingestion validates rows against
//! that registry.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::config::UpstreamConfig;
use crate::store::{BuildRecord, SampleStore};

/// How far back we ever ask the service for builds.
const MAX_BUILD_AGE_DAYS: i64 = 180;

/// Slack behind the newest known build, in case the service is slow to
/// index new releases.
const RESYNC_SLACK_DAYS: i64 = 7;

/// Build metadata client errors
#[derive(Debug, thiserror::Error)]
pub enum BuildHubError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed build document: {0}")]
    Malformed(String),
}

/// One released build as reported by the service.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildEntry {
    pub build_id: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
struct BuildsResponse {
    builds: Vec<BuildEntry>,
}

/// Client for the build-metadata service.
pub struct BuildHubClient {
    url: String,
    http: reqwest::Client,
}

impl BuildHubClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build build-metadata HTTP client")?;
        Ok(Self {
            url: config.buildhub_url.clone(),
            http,
        })
    }

    /// Released builds for a dimension combination with build ids at or
    /// after `min_build_id`.
    pub async fn fetch_builds(
        &self,
        product: &str,
        platform: &str,
        channel: &str,
        min_build_id: &str,
    ) -> Result<Vec<BuildEntry>, BuildHubError> {
        debug!(
            "Fetching builds: {}/{}/{} since {}",
            product, platform, channel, min_build_id
        );
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("product", product),
                ("platform", platform),
                ("channel", channel),
                ("min_build_id", min_build_id),
            ])
            .send()
            .await
            .map_err(|e| BuildHubError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BuildHubError::Network(format!("HTTP {}", response.status())));
        }
        let parsed: BuildsResponse = response
            .json()
            .await
            .map_err(|e| BuildHubError::Malformed(e.to_string()))?;
        Ok(parsed.builds)
    }

    /// The released version string for one build id, if the service
    /// knows the build.
    pub async fn version_for_build(
        &self,
        product: &str,
        platform: &str,
        channel: &str,
        build_id: &str,
    ) -> Result<Option<String>, BuildHubError> {
        let builds = self.fetch_builds(product, platform, channel, build_id).await?;
        Ok(builds
            .into_iter()
            .find(|b| b.build_id == build_id)
            .map(|b| b.version))
    }
}

/// Sync the build registry for every dimension combination in the
/// catalog. Returns the number of newly recorded builds.
pub async fn sync_builds(
    store: &SampleStore,
    catalog: &Catalog,
    client: &BuildHubClient,
) -> Result<usize> {
    let mut recorded = 0;
    for application in &catalog.applications {
        for platform in &catalog.platforms {
            for channel in &catalog.channels {
                recorded += sync_dimension_builds(
                    store,
                    client,
                    &application.name,
                    &platform.name,
                    &channel.name,
                )
                .await?;
            }
        }
    }
    info!("Build registry sync complete: {} new builds", recorded);
    Ok(recorded)
}

/// Sync one (application, platform, channel) combination.
pub async fn sync_dimension_builds(
    store: &SampleStore,
    client: &BuildHubClient,
    application: &str,
    platform: &str,
    channel: &str,
) -> Result<usize> {
    let min_build_id = min_sync_build_id(
        store.newest_build_id(application, platform, channel)?.as_deref(),
    );

    let builds = client
        .fetch_builds(application, platform, channel, &min_build_id)
        .await
        .with_context(|| {
            format!(
                "Failed to fetch builds for {}/{}/{}",
                application, platform, channel
            )
        })?;

    let mut recorded = 0;
    for entry in builds {
        let new = store.upsert_build(&BuildRecord {
            application: application.to_string(),
            platform: platform.to_string(),
            channel: channel.to_string(),
            build_id: entry.build_id,
            version: entry.version,
        })?;
        if new {
            recorded += 1;
        }
    }
    Ok(recorded)
}

/// Build-id floor for a sync: at most 180 days back, tightened to one
/// week before the newest build we already know about.
fn min_sync_build_id(newest_known: Option<&str>) -> String {
    let floor = Utc::now() - Duration::days(MAX_BUILD_AGE_DAYS);
    let floor_id = floor.format("%Y%m%d").to_string();
    if let Some(newest) = newest_known {
        if newest.len() >= 8 {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(&newest[..8], "%Y%m%d") {
                let slack = date - Duration::days(RESYNC_SLACK_DAYS);
                let slack_id = slack.format("%Y%m%d").to_string();
                if slack_id > floor_id {
                    return slack_id;
                }
            }
        }
    }
    floor_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_sync_build_id_without_history() {
        let floor = min_sync_build_id(None);
        assert_eq!(floor.len(), 8);
        let expected = (Utc::now() - Duration::days(MAX_BUILD_AGE_DAYS))
            .format("%Y%m%d")
            .to_string();
        assert_eq!(floor, expected);
    }

    #[test]
    fn test_min_sync_build_id_tightens_to_recent_history() {
        let newest = (Utc::now() - Duration::days(2)).format("%Y%m%d%H%M%S").to_string();
        let floor = min_sync_build_id(Some(&newest));
        let expected = (Utc::now() - Duration::days(2 + RESYNC_SLACK_DAYS))
            .format("%Y%m%d")
            .to_string();
        assert_eq!(floor, expected);
    }

    #[test]
    fn test_min_sync_build_id_ignores_malformed_history() {
        let floor = min_sync_build_id(Some("garbage"));
        let expected = (Utc::now() - Duration::days(MAX_BUILD_AGE_DAYS))
            .format("%Y%m%d")
            .to_string();
        assert_eq!(floor, expected);
    }
}
