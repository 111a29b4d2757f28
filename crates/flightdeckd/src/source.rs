//! Raw sample source client.
//!
//! The upstream OLAP service pre-aggregates telemetry into five-minute
//! windows per (window_start, build_id, display_version). We ask it for
//! one submission-date's worth of rows, bounded by a version range and
//! a build-id range, and get back JSON rows carrying the summed usage
//! hours, client counts and per-measure counts. Rows with no usage
//! hours are filtered server-side.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::config::UpstreamConfig;

/// Sample source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Parameters for one measure-rows fetch.
#[derive(Debug, Clone)]
pub struct MeasureQuery {
    /// Application name as the source knows it
    pub application: String,
    /// Platform name as the source knows it
    pub platform: String,
    pub channel: String,
    pub min_version: String,
    pub max_version: String,
    pub min_build_id: String,
    pub max_build_id: String,
    /// Only windows strictly after this instant (unix seconds)
    pub min_window_start: i64,
    /// Submission date partition, "YYYY-MM-DD"
    pub submission_date: String,
    pub measures: Vec<String>,
}

/// One pre-aggregated row from the source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceRow {
    /// Window start, unix seconds (the source reports UTC)
    pub window_start: i64,
    pub build_id: String,
    pub display_version: String,
    pub usage_hours: f64,
    pub client_count: i64,
    /// Summed counts per requested measure; a measure the source has no
    /// column for may be absent or null
    #[serde(default)]
    pub measure_counts: HashMap<String, Option<f64>>,
}

/// One pre-aggregated experiment row, keyed by branch.
#[derive(Debug, Clone, Deserialize)]
pub struct ExperimentRow {
    pub window_start: i64,
    pub branch: String,
    pub usage_hours: f64,
    pub client_count: i64,
    #[serde(default)]
    pub measure_counts: HashMap<String, Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct MeasureRowsResponse {
    rows: Vec<SourceRow>,
}

#[derive(Debug, Deserialize)]
struct ExperimentRowsResponse {
    rows: Vec<ExperimentRow>,
}

/// Client for the raw sample source.
pub struct SampleSource {
    url: String,
    http: reqwest::Client,
}

impl SampleSource {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build sample source HTTP client")?;
        Ok(Self {
            url: config.sample_source_url.clone(),
            http,
        })
    }

    /// Fetch one window of measure rows.
    pub async fn fetch_measure_rows(&self, query: &MeasureQuery) -> Result<Vec<SourceRow>, SourceError> {
        debug!(
            "Querying sample source: {}/{}/{} versions [{}, {}) builds ({}, {}) since {}",
            query.application,
            query.platform,
            query.channel,
            query.min_version,
            query.max_version,
            query.min_build_id,
            query.max_build_id,
            query.min_window_start
        );
        let min_window_start = query.min_window_start.to_string();
        let measure_list = query.measures.join(",");
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("application", query.application.as_str()),
                ("os_name", query.platform.as_str()),
                ("channel", query.channel.as_str()),
                ("min_version", query.min_version.as_str()),
                ("max_version", query.max_version.as_str()),
                ("min_build_id", query.min_build_id.as_str()),
                ("max_build_id", query.max_build_id.as_str()),
                ("min_window_start", min_window_start.as_str()),
                ("submission_date", query.submission_date.as_str()),
                ("measures", measure_list.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Network(format!("HTTP {}", response.status())));
        }
        let parsed: MeasureRowsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(parsed.rows)
    }

    /// Fetch branch-keyed rows for one experiment.
    pub async fn fetch_experiment_rows(
        &self,
        experiment: &str,
        measures: &[String],
        min_window_start: i64,
        min_submission_date: &str,
    ) -> Result<Vec<ExperimentRow>, SourceError> {
        debug!(
            "Querying sample source for experiment {} since {}",
            experiment, min_window_start
        );
        let min_window_start = min_window_start.to_string();
        let measure_list = measures.join(",");
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("experiment_id", experiment),
                ("min_window_start", min_window_start.as_str()),
                ("min_submission_date", min_submission_date),
                ("measures", measure_list.as_str()),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SourceError::Network(format!("HTTP {}", response.status())));
        }
        let parsed: ExperimentRowsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;
        Ok(parsed.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_row_deserializes_with_null_counts() {
        let row: SourceRow = serde_json::from_str(
            r#"{
                "window_start": 1498722600,
                "build_id": "20170629075044",
                "display_version": "55.0",
                "usage_hours": 20.5,
                "client_count": 100,
                "measure_counts": {"main_crashes": 3.0, "gpu_crashes": null}
            }"#,
        )
        .unwrap();
        assert_eq!(row.build_id, "20170629075044");
        assert_eq!(row.measure_counts.get("main_crashes"), Some(&Some(3.0)));
        assert_eq!(row.measure_counts.get("gpu_crashes"), Some(&None));
    }

    #[test]
    fn test_source_row_tolerates_missing_counts() {
        let row: SourceRow = serde_json::from_str(
            r#"{
                "window_start": 1498722600,
                "build_id": "20170629075044",
                "display_version": "55.0",
                "usage_hours": 20.5,
                "client_count": 100
            }"#,
        )
        .unwrap();
        assert!(row.measure_counts.is_empty());
    }
}
