//! Relative alignment engine.
//!
//! Serves the measure-data queries: absolute mode returns each build's
//! raw samples in a wall-clock window; relative mode re-bases each
//! target version onto "seconds since that version's first sample" so
//! versions that shipped weeks apart overlay on one axis.

use anyhow::Result;
use flightdeck_common::version::cmp_version_strings;
use flightdeck_common::{DimensionKey, MeasureData, SeriesData};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::store::SampleStore;

/// How many distinct versions before the anchor are auto-selected when
/// the caller doesn't name any.
pub const AUTO_PRIOR_VERSION_COUNT: usize = 3;

/// A measure-data request, already validated.
#[derive(Debug, Clone, Default)]
pub struct DataQuery {
    /// Window length in seconds. In relative mode 0 means "derive the
    /// anchor version's first-to-last sample span".
    pub interval: i64,
    /// Absolute mode: explicit window start (default now - interval).
    /// Relative mode: reinterpreted as the starting offset (default 0).
    pub start: Option<i64>,
    pub relative: bool,
    /// Relative mode only: explicit target versions
    pub versions: Vec<String>,
}

/// Run a measure-data query. `now` anchors the default absolute window.
pub fn measure_data(
    store: &SampleStore,
    dim: &DimensionKey,
    query: &DataQuery,
    now: i64,
) -> Result<MeasureData> {
    if query.relative {
        relative_data(store, dim, query)
    } else {
        absolute_data(store, dim, query, now)
    }
}

/// Raw samples keyed by build id, window [start, start + interval].
fn absolute_data(
    store: &SampleStore,
    dim: &DimensionKey,
    query: &DataQuery,
    now: i64,
) -> Result<MeasureData> {
    let start = query.start.unwrap_or(now - query.interval);
    let end = start + query.interval;

    let samples = store.samples_by_build(
        &dim.application,
        &dim.platform,
        &dim.channel,
        &dim.measure,
        start,
        end,
    )?;

    let mut measure_data: BTreeMap<String, SeriesData> = BTreeMap::new();
    for sample in samples {
        let series = measure_data
            .entry(sample.build_id.clone())
            .or_insert_with(|| SeriesData {
                version: sample.version.clone(),
                data: Vec::new(),
            });
        series.data.push((sample.timestamp, sample.value, sample.usage_hours));
    }
    Ok(MeasureData { measure_data })
}

/// Samples keyed by version, re-based onto seconds since each
/// version's own first sample.
fn relative_data(store: &SampleStore, dim: &DimensionKey, query: &DataQuery) -> Result<MeasureData> {
    let targets = if query.versions.is_empty() {
        auto_select_versions(store, dim)?
    } else {
        query.versions.clone()
    };

    // the anchor is the newest target; it defines the derived interval
    let anchor = targets
        .iter()
        .max_by(|a, b| cmp_version_strings(a, b))
        .cloned();

    let offset_start = query.start.unwrap_or(0);
    let interval = if query.interval == 0 {
        match &anchor {
            Some(anchor) => {
                let samples = store.samples_for_version(
                    &dim.application,
                    &dim.platform,
                    &dim.channel,
                    &dim.measure,
                    anchor,
                )?;
                match (samples.first(), samples.last()) {
                    (Some(first), Some(last)) => last.0 - first.0,
                    _ => 0,
                }
            }
            None => 0,
        }
    } else {
        query.interval
    };

    let mut measure_data = BTreeMap::new();
    for version in &targets {
        let samples = store.samples_for_version(
            &dim.application,
            &dim.platform,
            &dim.channel,
            &dim.measure,
            version,
        )?;
        let zero_point = match samples.first() {
            Some(first) => first.0,
            None => continue,
        };
        let data: Vec<(i64, f64, f64)> = samples
            .iter()
            .filter_map(|&(timestamp, value, usage_hours)| {
                let offset = timestamp - zero_point;
                (offset >= offset_start && offset <= offset_start + interval)
                    .then_some((offset, value, usage_hours))
            })
            .collect();
        if data.is_empty() {
            continue;
        }
        measure_data.insert(
            version.clone(),
            SeriesData {
                version: version.clone(),
                data,
            },
        );
    }
    Ok(MeasureData { measure_data })
}

/// The most recently active build's version plus up to three prior
/// distinct versions.
fn auto_select_versions(store: &SampleStore, dim: &DimensionKey) -> Result<Vec<String>> {
    let (_, anchor_version) = match store.most_recent_build(
        &dim.application,
        &dim.platform,
        &dim.channel,
        &dim.measure,
    )? {
        Some(build) => build,
        None => return Ok(Vec::new()),
    };

    let mut versions: Vec<String> = store
        .version_spans(&dim.application, &dim.platform, &dim.channel, &dim.measure)?
        .into_iter()
        .map(|span| span.version)
        .collect();
    versions.sort_by(|a, b| cmp_version_strings(a, b));
    versions.dedup();

    let prior: Vec<String> = versions
        .iter()
        .filter(|v| cmp_version_strings(v, &anchor_version) == Ordering::Less)
        .rev()
        .take(AUTO_PRIOR_VERSION_COUNT)
        .cloned()
        .collect();

    let mut targets = vec![anchor_version];
    targets.extend(prior);
    Ok(targets)
}
