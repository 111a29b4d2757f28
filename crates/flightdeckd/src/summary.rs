//! Rate summarizer.
//!
//! Reduces a dimension's samples into per-version-bucket rate records:
//! usage-normalized, outlier-trimmed rates over the bucket's own window
//! plus an "adjusted" rate over a window of the newest bucket's field
//! duration, so a two-year-old release and a two-day-old one compare
//! over equal elapsed time.

use anyhow::Result;
use chrono::DateTime;
use flightdeck_common::version::Version;
use flightdeck_common::{DimensionKey, MeasureSummary, VersionSummary};

use crate::grouping::{bucket_windows, GroupingPolicy};
use crate::store::SampleStore;

/// Summarization knobs, resolved per channel by the caller.
#[derive(Debug, Clone)]
pub struct SummaryOptions {
    pub policy: GroupingPolicy,
    /// Quantile of per-sample rates kept for the rate aggregate
    pub trim_quantile: f64,
}

struct RateAggregate {
    count: i64,
    rate: Option<f64>,
}

/// Build the summary for one dimension. Returns None when the
/// dimension has no usable samples in the lookback range ("no data",
/// not an error).
pub fn build_measure_summary(
    store: &SampleStore,
    dim: &DimensionKey,
    current_version: &Version,
    opts: &SummaryOptions,
) -> Result<Option<MeasureSummary>> {
    let spans = store.version_spans(&dim.application, &dim.platform, &dim.channel, &dim.measure)?;
    let windows = bucket_windows(&spans, current_version, &opts.policy);
    if windows.is_empty() {
        return Ok(None);
    }

    // newest sample timestamp across every version in the lookback
    // range, not per bucket
    let current_major = current_version.major();
    let min_major = current_major.saturating_sub(opts.policy.lookback);
    let last_updated = spans
        .iter()
        .filter(|span| {
            Version::parse(&span.version)
                .map(|v| v.major() >= min_major && v.major() <= current_major)
                .unwrap_or(false)
        })
        .map(|span| span.last_ts)
        .max();
    let last_updated = match last_updated.and_then(|ts| DateTime::from_timestamp(ts, 0)) {
        Some(ts) => ts,
        None => return Ok(None),
    };

    let mut versions = Vec::with_capacity(windows.len());
    for window in &windows {
        let mut record = VersionSummary {
            version: window.label.clone(),
            field_duration: window.field_duration,
            rate: None,
            count: None,
            adjusted_rate: None,
            adjusted_count: None,
        };
        for (adjusted, interval) in [(false, window.field_duration), (true, window.adjusted_duration)]
        {
            let pairs = store.samples_for_versions(
                &dim.application,
                &dim.platform,
                &dim.channel,
                &dim.measure,
                &window.members,
                window.start,
                window.start + interval,
            )?;
            if pairs.is_empty() {
                // mostly seen while backfilling: the bucket exists but
                // this integration window has nothing in it yet
                continue;
            }
            let aggregate = trimmed_rate(&pairs, opts.trim_quantile);
            if adjusted {
                record.adjusted_count = Some(aggregate.count);
                record.adjusted_rate = aggregate.rate;
            } else {
                record.count = Some(aggregate.count);
                record.rate = aggregate.rate;
            }
        }
        versions.push(record);
    }

    // newest version first: recent sub-versions, then major buckets
    versions.reverse();

    Ok(Some(MeasureSummary {
        versions,
        last_updated,
    }))
}

/// Aggregate (value, usage_hours) pairs: the count is the untrimmed
/// total, the rate (per 1000 usage hours) drops the top slice of
/// per-sample rates so a single implausible host can't dominate.
fn trimmed_rate(pairs: &[(f64, f64)], trim_quantile: f64) -> RateAggregate {
    let count = pairs.iter().map(|(value, _)| value).sum::<f64>() as i64;

    let mut rated: Vec<(f64, f64, f64)> = pairs
        .iter()
        .map(|&(value, usage_hours)| (value / (usage_hours / 1000.0), value, usage_hours))
        .collect();
    rated.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let keep = ((rated.len() as f64) * trim_quantile).ceil() as usize;
    let kept = &rated[..keep.min(rated.len())];

    let value_sum: f64 = kept.iter().map(|(_, value, _)| value).sum();
    let usage_sum: f64 = kept.iter().map(|(_, _, usage_hours)| usage_hours / 1000.0).sum();
    let rate = if usage_sum > 0.0 {
        Some(round2(value_sum / usage_sum))
    } else {
        None
    };

    RateAggregate { count, rate }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{BuildRecord, SampleInsert};
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;

    fn test_store() -> (SampleStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        (SampleStore::open_at(tmp.path()).unwrap(), tmp)
    }

    fn dim() -> DimensionKey {
        DimensionKey::new("firefox", "linux", "release", "main_crashes")
    }

    fn add_build(store: &SampleStore, build_id: &str, version: &str) -> i64 {
        store
            .upsert_build(&BuildRecord {
                application: "firefox".to_string(),
                platform: "linux".to_string(),
                channel: "release".to_string(),
                build_id: build_id.to_string(),
                version: version.to_string(),
            })
            .unwrap();
        store
            .build_ref("linux", "release", build_id, version)
            .unwrap()
            .unwrap()
    }

    fn add_samples(store: &SampleStore, build_ref: i64, rows: &[(i64, f64, f64)]) {
        let inserts: Vec<SampleInsert> = rows
            .iter()
            .map(|&(timestamp, value, usage_hours)| SampleInsert {
                build_ref,
                measure: "main_crashes".to_string(),
                timestamp,
                value,
                usage_hours,
                client_count: 100,
            })
            .collect();
        store.insert_samples_bulk(&inserts).unwrap();
    }

    fn options() -> SummaryOptions {
        SummaryOptions {
            policy: GroupingPolicy {
                lookback: 3,
                recent_subversion_count: 3,
                continuous_releases: false,
            },
            trim_quantile: 0.999,
        }
    }

    fn current(v: &str) -> Version {
        Version::parse(v).unwrap()
    }

    #[test]
    fn test_no_samples_is_no_data() {
        let (store, _tmp) = test_store();
        let summary = build_measure_summary(&store, &dim(), &current("55.0"), &options()).unwrap();
        assert!(summary.is_none());
    }

    #[test]
    fn test_single_version_rate() {
        let (store, _tmp) = test_store();
        let build = add_build(&store, "20170629075044", "55.0");
        // 100 crashes over 20 hours, 10 over 16, 10 over 20
        add_samples(
            &store,
            build,
            &[(0, 100.0, 20.0), (300, 10.0, 16.0), (600, 10.0, 20.0)],
        );
        let summary = build_measure_summary(&store, &dim(), &current("55.0"), &options())
            .unwrap()
            .unwrap();
        // newest first: the 55.0 sub-version record, then the 55 bucket
        assert_eq!(summary.versions[0].version, "55.0");
        assert_eq!(summary.versions[1].version, "55");
        let record = &summary.versions[1];
        assert_eq!(record.count, Some(120));
        // 120 / ((20 + 16 + 20) / 1000) = 2142.857...
        assert_relative_eq!(record.rate.unwrap(), 2142.86, epsilon = 1e-9);
        assert_eq!(record.field_duration, 600);
        assert_eq!(summary.last_updated.timestamp(), 600);
    }

    #[test]
    fn test_count_is_untrimmed_while_rate_is_trimmed() {
        let (store, _tmp) = test_store();
        let build = add_build(&store, "20170629075044", "55.0");
        // 999 well-behaved samples and one implausible spike
        let mut rows: Vec<(i64, f64, f64)> = (0..999).map(|i| (i * 60, 1.0, 10.0)).collect();
        rows.push((999 * 60, 100_000.0, 0.001));
        add_samples(&store, build, &rows);
        let summary = build_measure_summary(&store, &dim(), &current("55.0"), &options())
            .unwrap()
            .unwrap();
        let record = summary
            .versions
            .iter()
            .find(|r| r.version == "55")
            .unwrap();
        // the count keeps the outlier
        assert_eq!(record.count, Some(100_999));
        // the rate drops it: 999 / (999 * 10 / 1000) = 100
        assert_relative_eq!(record.rate.unwrap(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_adjusted_pair_omitted_when_window_is_empty() {
        let (store, _tmp) = test_store();
        let old = add_build(&store, "20170501000000", "54.0");
        let new = add_build(&store, "20170629075044", "55.0");
        // 54's samples sit mid-window, well past the adjusted span
        add_samples(&store, old, &[(0, 1.0, 10.0), (5 * DAY, 50.0, 10.0), (20 * DAY - 1, 1.0, 10.0)]);
        add_samples(&store, new, &[(20 * DAY, 3.0, 10.0), (22 * DAY, 3.0, 10.0)]);
        let summary = build_measure_summary(&store, &dim(), &current("55.0"), &options())
            .unwrap()
            .unwrap();
        let v54 = summary
            .versions
            .iter()
            .find(|r| r.version == "54")
            .unwrap();
        // own window [1d, 21d] catches the 5d sample
        assert!(v54.rate.is_some());
        // adjusted window [1d, 3d] is empty: pair omitted, not zeroed
        assert!(v54.adjusted_rate.is_none());
        assert!(v54.adjusted_count.is_none());
    }

    #[test]
    fn test_newest_version_first_ordering() {
        let (store, _tmp) = test_store();
        let b54 = add_build(&store, "20170501000000", "54.0");
        let b55 = add_build(&store, "20170629075044", "55.0");
        add_samples(&store, b54, &[(0, 1.0, 10.0), (10 * HOUR, 1.0, 10.0)]);
        add_samples(&store, b55, &[(10 * HOUR, 2.0, 10.0), (12 * HOUR, 2.0, 10.0)]);
        let summary = build_measure_summary(&store, &dim(), &current("55.0"), &options())
            .unwrap()
            .unwrap();
        let labels: Vec<_> = summary.versions.iter().map(|r| r.version.clone()).collect();
        assert_eq!(labels, vec!["55.0", "55", "54"]);
        for record in &summary.versions {
            if let Some(rate) = record.rate {
                assert!(rate >= 0.0);
            }
        }
    }

    #[test]
    fn test_trimmed_rate_rounds_to_two_decimals() {
        let aggregate = trimmed_rate(&[(1.0, 3.0)], 0.999);
        // 1 / (3/1000) = 333.333... -> 333.33
        assert_relative_eq!(aggregate.rate.unwrap(), 333.33, epsilon = 1e-9);
        assert_eq!(aggregate.count, 1);
    }

    #[test]
    fn test_trim_keeps_at_least_one_sample() {
        let aggregate = trimmed_rate(&[(10.0, 5.0)], 0.999);
        assert_eq!(aggregate.count, 10);
        assert!(aggregate.rate.is_some());
    }
}
