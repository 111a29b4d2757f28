//! Ingestion/merge engine.
//!
//! Pulls one submission-date window of pre-aggregated rows from the
//! raw sample source, validates every row against the build registry
//! and the data-integrity rules, and merges the survivors into the
//! sample store. Each merged dimension then gets its summary refreshed
//! in the background.

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use flightdeck_common::version::{cmp_version_strings, major_version, Version};
use flightdeck_common::DimensionKey;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::engine::Engine;
use crate::feed::FeedError;
use crate::source::{MeasureQuery, SourceError, SourceRow};
use crate::store::{SampleInsert, SampleStore};

/// Ingestion errors. `NoValidVersions` is the hard no-anchor failure
/// the scheduler is expected to retry; the per-row integrity failures
/// never surface here, they are counted and dropped.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("unknown application: {0}")]
    UnknownApplication(String),

    #[error("unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("no measures configured for {0}/{1}/{2}")]
    NoMeasures(String, String, String),

    #[error("no valid versions found for combination: {0}/{1}/{2}")]
    NoValidVersions(String, String, String),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Caller-supplied ingestion options.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Explicit submission date for backfill; defaults to today (UTC)
    pub submission_date: Option<NaiveDate>,
    /// true: single-transaction insert that assumes no duplicates.
    /// false: row-at-a-time insert that skips rows already stored.
    pub bulk: bool,
}

/// What one ingestion call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub fetched_rows: usize,
    pub inserted: usize,
    pub skipped_unknown_build: usize,
    pub skipped_invalid: usize,
    pub skipped_implausible: usize,
}

/// Fetch and merge one window for a dimension combination, then kick
/// off summary refreshes for its measures.
pub async fn update_measures(
    engine: &Engine,
    application: &str,
    platform: &str,
    channel: &str,
    opts: IngestOptions,
) -> Result<IngestReport, IngestError> {
    info!(
        "Updating measures: {} {} (date: {})",
        channel,
        platform,
        opts.submission_date
            .map(|d| d.to_string())
            .unwrap_or_else(|| "latest".to_string())
    );

    let catalog = engine.catalog();
    let application_def = catalog
        .application(application)
        .ok_or_else(|| IngestError::UnknownApplication(application.to_string()))?;
    let platform_def = catalog
        .platform(platform)
        .ok_or_else(|| IngestError::UnknownPlatform(platform.to_string()))?;
    let channel_def = catalog
        .channel(channel)
        .ok_or_else(|| IngestError::UnknownChannel(channel.to_string()))?;
    let measures: Vec<String> = catalog
        .measures_for(application, platform, channel)
        .iter()
        .map(|m| m.name.clone())
        .collect();
    if measures.is_empty() {
        return Err(IngestError::NoMeasures(
            application.to_string(),
            platform.to_string(),
            channel.to_string(),
        ));
    }

    let store = engine.store()?;

    let explicit_date = opts.submission_date.is_some();
    let submission_date = opts
        .submission_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let submission_start = submission_date.and_time(NaiveTime::MIN).and_utc();

    // when refreshing the current day, advance the floor to the newest
    // sample already stored so only new windows come back
    let mut min_window_start = submission_start.timestamp();
    if !explicit_date {
        if let Some(newest) = store.max_sample_timestamp_since(
            application,
            platform,
            channel,
            &measures,
            min_window_start,
        )? {
            min_window_start = newest;
        }
    }

    // ignore builds older than twice the channel's rollout cadence, or
    // newer than a day past the target date (clock skew)
    let min_buildid_timestamp = submission_start - channel_def.update_interval() * 2;
    let max_buildid_timestamp = submission_start + Duration::days(1);
    let min_build_id = min_buildid_timestamp.format("%Y%m%d").to_string();
    let max_build_id = max_buildid_timestamp.format("%Y%m%d").to_string();

    // restrict the source query to versions actually released in the
    // build-id window, so bogus telemetry version strings are never
    // absorbed
    let mut valid_versions = store.versions_in_buildid_range(
        application,
        platform,
        channel,
        &min_build_id,
        &max_build_id,
    )?;
    valid_versions.sort_by(|a, b| cmp_version_strings(a, b));
    let majors: Vec<u32> = valid_versions
        .iter()
        .filter_map(|v| major_version(v))
        .collect();
    let (min_major, max_major) = match (majors.iter().min(), majors.iter().max()) {
        (Some(min), Some(max)) => (*min, *max),
        _ => {
            return Err(IngestError::NoValidVersions(
                application.to_string(),
                platform.to_string(),
                channel.to_string(),
            ))
        }
    };

    // telemetry version ordering is unreliable for pre-release
    // suffixes; on beta, anything past the published version is noise
    let beta_ceiling = if channel == "beta" {
        let raw = engine.feed().current_version(channel).await?;
        Version::parse(&raw)
    } else {
        None
    };

    let query = MeasureQuery {
        application: application_def.telemetry_name.clone(),
        platform: platform_def.telemetry_name.clone(),
        channel: channel.to_string(),
        min_version: min_major.to_string(),
        max_version: (max_major + 1).to_string(),
        min_build_id,
        max_build_id,
        min_window_start,
        submission_date: submission_date.format("%Y-%m-%d").to_string(),
        measures: measures.clone(),
    };
    let rows = engine.source().fetch_measure_rows(&query).await?;

    let report = merge_rows(
        &store,
        platform,
        channel,
        &measures,
        beta_ceiling.as_ref(),
        &rows,
        opts.bulk,
    )?;
    info!(
        "Merged {} samples for {}/{}/{} ({} rows fetched, {} unknown builds skipped)",
        report.inserted, application, platform, channel, report.fetched_rows,
        report.skipped_unknown_build
    );

    // refresh the derived summaries in the background; a failure there
    // must not fail the ingestion
    for measure in &measures {
        engine.spawn_summary_refresh(DimensionKey::new(application, platform, channel, measure));
    }

    Ok(report)
}

/// Validate rows and write the survivors. Split from the fetch so the
/// row rules are testable without a live source.
pub fn merge_rows(
    store: &SampleStore,
    platform: &str,
    channel: &str,
    measures: &[String],
    beta_ceiling: Option<&Version>,
    rows: &[SourceRow],
    bulk: bool,
) -> Result<IngestReport, IngestError> {
    let mut report = IngestReport {
        fetched_rows: rows.len(),
        ..Default::default()
    };

    let mut build_cache: HashMap<(String, String), Option<i64>> = HashMap::new();
    let mut inserts: Vec<SampleInsert> = Vec::new();

    for row in rows {
        if row.usage_hours <= 0.0 {
            report.skipped_invalid += 1;
            continue;
        }
        if let Some(ceiling) = beta_ceiling {
            if let Some(display) = Version::parse(&row.display_version) {
                if display > *ceiling {
                    debug!(
                        "Skipping implausible version {} (published: beta ceiling)",
                        row.display_version
                    );
                    report.skipped_implausible += 1;
                    continue;
                }
            }
        }

        let key = (row.build_id.clone(), row.display_version.clone());
        let build_ref = match build_cache.get(&key) {
            Some(cached) => *cached,
            None => {
                let fetched = store
                    .build_ref(platform, channel, &row.build_id, &row.display_version)
                    .context("build registry lookup failed")?;
                build_cache.insert(key, fetched);
                fetched
            }
        };
        let build_ref = match build_ref {
            Some(id) => id,
            None => {
                // build not released by us
                debug!(
                    "Skipping unknown build {} ({})",
                    row.build_id, row.display_version
                );
                report.skipped_unknown_build += 1;
                continue;
            }
        };

        for measure in measures {
            let count = row
                .measure_counts
                .get(measure)
                .copied()
                .flatten()
                .unwrap_or(0.0);
            // negative measures should be rejected at ping validation,
            // but that is not yet the case upstream
            if count < 0.0 {
                report.skipped_invalid += 1;
                continue;
            }
            inserts.push(SampleInsert {
                build_ref,
                measure: measure.clone(),
                timestamp: row.window_start,
                value: count,
                usage_hours: row.usage_hours,
                client_count: row.client_count,
            });
        }
    }

    if bulk {
        store.insert_samples_bulk(&inserts)?;
        report.inserted = inserts.len();
    } else {
        report.inserted = store.insert_samples_safe(&inserts)?;
    }
    Ok(report)
}
