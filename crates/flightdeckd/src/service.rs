//! Query service layer.
//!
//! The read contract the HTTP surface (out of scope here) is built on.
//! Every operation takes raw optional parameters, validates them first,
//! and keeps the error taxonomy straight: missing/malformed parameters
//! are client errors, an unknown dimension or one with no data at all
//! is not-found, and a valid dimension with an empty window is an
//! empty (non-error) result.

use chrono::Utc;
use flightdeck_common::{
    CatalogEntry, CatalogSummary, DimensionKey, ExperimentData, MeasureData, MeasureStatus,
    MeasureSummary,
};
use std::collections::BTreeMap;

use crate::align::{self, DataQuery};
use crate::engine::Engine;

/// Query-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid parameter {0}: {1}")]
    InvalidParameter(&'static str, String),

    #[error("unknown dimension: {0}")]
    UnknownDimension(String),

    #[error("no data found for: {0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Raw parameters of a measure-summary request.
#[derive(Debug, Clone, Default)]
pub struct SummaryParams {
    pub application: Option<String>,
    pub platform: Option<String>,
    pub channel: Option<String>,
    pub measure: Option<String>,
}

/// Raw parameters of a measure-data request.
#[derive(Debug, Clone, Default)]
pub struct MeasureDataParams {
    pub application: Option<String>,
    pub platform: Option<String>,
    pub channel: Option<String>,
    pub measure: Option<String>,
    pub interval: Option<i64>,
    pub start: Option<i64>,
    pub relative: bool,
    pub versions: Vec<String>,
}

/// Raw parameters of an experiment-data request.
#[derive(Debug, Clone, Default)]
pub struct ExperimentDataParams {
    pub experiment: Option<String>,
    pub measure: Option<String>,
    pub interval: Option<i64>,
    pub start: Option<i64>,
}

/// Raw parameters of a catalog-summary request.
#[derive(Debug, Clone, Default)]
pub struct CatalogSummaryParams {
    pub platform: Option<String>,
    pub channel: Option<String>,
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, QueryError> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or(QueryError::MissingParameter(name))
}

fn validated_dimension(engine: &Engine, params: &SummaryParams) -> Result<DimensionKey, QueryError> {
    let application = require(&params.application, "application")?;
    let platform = require(&params.platform, "platform")?;
    let channel = require(&params.channel, "channel")?;
    let measure = require(&params.measure, "measure")?;

    let dim = DimensionKey::new(application, platform, channel, measure);
    let catalog = engine.catalog();
    if catalog.application(application).is_none()
        || catalog.platform(platform).is_none()
        || catalog.channel(channel).is_none()
        || catalog.measure(application, platform, channel, measure).is_none()
    {
        return Err(QueryError::UnknownDimension(dim.to_string()));
    }
    Ok(dim)
}

/// Measure summary for a dimension, read through the summary cache and
/// recomputed on miss. `Ok(None)` is the explicit "no data" outcome.
pub async fn measure_summary(
    engine: &Engine,
    params: &SummaryParams,
) -> Result<Option<MeasureSummary>, QueryError> {
    let dim = validated_dimension(engine, params)?;

    if let Some(cached) = engine.cache().get(&dim.summary_cache_key()) {
        return Ok(Some(cached));
    }
    let summary = engine.refresh_summary(&dim).await?;
    Ok(summary)
}

/// Measure data for a dimension, absolute or relative mode.
pub fn measure_data(engine: &Engine, params: &MeasureDataParams) -> Result<MeasureData, QueryError> {
    let dim = validated_dimension(
        engine,
        &SummaryParams {
            application: params.application.clone(),
            platform: params.platform.clone(),
            channel: params.channel.clone(),
            measure: params.measure.clone(),
        },
    )?;
    let interval = params.interval.ok_or(QueryError::MissingParameter("interval"))?;
    if interval < 0 {
        return Err(QueryError::InvalidParameter(
            "interval",
            interval.to_string(),
        ));
    }

    let store = engine.store()?;
    if !store.dimension_has_data(&dim.application, &dim.platform, &dim.channel, &dim.measure)? {
        return Err(QueryError::NotFound(dim.to_string()));
    }

    let query = DataQuery {
        interval,
        start: params.start,
        relative: params.relative,
        versions: params.versions.clone(),
    };
    Ok(align::measure_data(&store, &dim, &query, Utc::now().timestamp())?)
}

/// Branch-keyed experiment data.
pub fn experiment_data(
    engine: &Engine,
    params: &ExperimentDataParams,
) -> Result<ExperimentData, QueryError> {
    let experiment = require(&params.experiment, "experiment")?;
    let measure = require(&params.measure, "measure")?;
    let interval = params.interval.ok_or(QueryError::MissingParameter("interval"))?;
    if interval < 0 {
        return Err(QueryError::InvalidParameter(
            "interval",
            interval.to_string(),
        ));
    }

    let store = engine.store()?;
    if store.experiment_max_timestamp(experiment)?.is_none() {
        return Err(QueryError::NotFound(experiment.to_string()));
    }

    let start = params.start.unwrap_or_else(|| Utc::now().timestamp() - interval);
    let end = start + interval;
    let rows = store.experiment_samples(experiment, measure, start, end)?;

    let mut measure_data: BTreeMap<String, Vec<(i64, f64, f64)>> = BTreeMap::new();
    for (branch, timestamp, value, usage_hours) in rows {
        measure_data
            .entry(branch)
            .or_default()
            .push((timestamp, value, usage_hours));
    }
    Ok(ExperimentData { measure_data })
}

/// Expected measures (and any cached summaries) per dimension
/// combination, optionally filtered by platform and/or channel.
pub fn catalog_summary(engine: &Engine, params: &CatalogSummaryParams) -> CatalogSummary {
    let catalog = engine.catalog();
    let mut summaries = Vec::new();
    for (application, platform, channel) in catalog.dimension_combinations() {
        if let Some(filter) = params.platform.as_deref() {
            if platform.name != filter {
                continue;
            }
        }
        if let Some(filter) = params.channel.as_deref() {
            if channel.name != filter {
                continue;
            }
        }
        let measures = catalog
            .measures_for(&application.name, &platform.name, &channel.name)
            .into_iter()
            .map(|m| {
                let dim =
                    DimensionKey::new(&application.name, &platform.name, &channel.name, &m.name);
                MeasureStatus {
                    name: m.name.clone(),
                    summary: engine.cache().get(&dim.summary_cache_key()),
                }
            })
            .collect();
        summaries.push(CatalogEntry {
            application: application.name.clone(),
            platform: platform.name.clone(),
            channel: channel.name.clone(),
            measures,
        });
    }
    CatalogSummary { summaries }
}
