//! Shared data and API result types.
//!
//! The summary and series types are the JSON artifacts consumed by the
//! dashboard; field names follow that contract (camelCase for summaries,
//! `measure_data` for series payloads).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One logical metric stream: (application, platform, channel, measure).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionKey {
    pub application: String,
    pub platform: String,
    pub channel: String,
    pub measure: String,
}

impl DimensionKey {
    pub fn new(application: &str, platform: &str, channel: &str, measure: &str) -> Self {
        Self {
            application: application.to_string(),
            platform: platform.to_string(),
            channel: channel.to_string(),
            measure: measure.to_string(),
        }
    }

    /// Stable lowercase cache key for the derived summary of this stream.
    pub fn summary_cache_key(&self) -> String {
        [
            self.application.as_str(),
            self.platform.as_str(),
            self.channel.as_str(),
            self.measure.as_str(),
            "summary",
        ]
        .iter()
        .map(|s| s.to_lowercase())
        .collect::<Vec<_>>()
        .join(":")
    }
}

impl std::fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.application, self.platform, self.channel, self.measure
        )
    }
}

/// Rate record for one version bucket (or one recent sub-version).
///
/// The rate/count pairs are omitted entirely when no samples fell inside
/// the corresponding integration window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version: String,

    /// Seconds between the bucket's unshifted start and its end.
    pub field_duration: i64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_rate: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub adjusted_count: Option<i64>,
}

/// Derived summary for one dimension, newest version first.
///
/// Rebuilt wholesale on every refresh, never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureSummary {
    pub versions: Vec<VersionSummary>,
    pub last_updated: DateTime<Utc>,
}

/// One build's (or one version's) series: a version label plus ascending
/// `(timestamp, value, usage_hours)` triples. In absolute mode the first
/// element is a unix timestamp; in relative mode it is whole seconds
/// since the version's first observed sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    pub version: String,
    pub data: Vec<(i64, f64, f64)>,
}

/// Measure-data query result, keyed by build id (absolute mode) or by
/// version (relative mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureData {
    pub measure_data: BTreeMap<String, SeriesData>,
}

/// Experiment-data query result, keyed by branch name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentData {
    pub measure_data: BTreeMap<String, Vec<(i64, f64, f64)>>,
}

/// Per-measure slot in the catalog summary: the expected measure name
/// plus its latest cached summary, if one exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasureStatus {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<MeasureSummary>,
}

/// One (application, channel, platform) combination with its expected
/// measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub application: String,
    pub platform: String,
    pub channel: String,
    pub measures: Vec<MeasureStatus>,
}

/// Catalog summary query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub summaries: Vec<CatalogEntry>,
}
