//! Version grouping and windowing.
//!
//! Turns the distinct observed versions of a dimension into ordered
//! version buckets with censored observation windows: a bucket's window
//! ends where the next bucket's begins, the newest bucket stays
//! open-ended, and noisy first-day data is clipped from long-lived
//! buckets before any statistics are computed.

use flightdeck_common::version::Version;

use crate::store::VersionSpan;

/// How much of a bucket's early window is clipped as rollout noise.
pub const NOISE_CLIP_SECS: i64 = 24 * 60 * 60;

/// Buckets whose raw window is shorter than this keep their full window.
pub const NOISE_CLIP_MIN_SPAN_SECS: i64 = 2 * 24 * 60 * 60;

/// One bucket ready for summarization: the exact member versions to
/// match, the (possibly clipped) start, and the two integration
/// durations.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketWindow {
    /// "55" for a major bucket, "55.0.1" for a recent sub-version
    pub label: String,
    /// Exact version strings whose samples belong to this bucket
    pub members: Vec<String>,
    /// Clipped window start (unix seconds)
    pub start: i64,
    /// Unshifted end minus unshifted start, in seconds
    pub field_duration: i64,
    /// Integration span for the adjusted rate: the newest major
    /// bucket's field duration, or the bucket's own when there is no
    /// usable reference
    pub adjusted_duration: i64,
}

/// Channel-dependent grouping knobs.
#[derive(Debug, Clone)]
pub struct GroupingPolicy {
    /// Major versions behind the current one to include
    pub lookback: u32,
    /// Trailing sub-versions of the current major that get their own
    /// record
    pub recent_subversion_count: usize,
    /// Continuous-release channel: no per-sub-version records
    pub continuous_releases: bool,
}

struct RawWindow {
    label: String,
    members: Vec<String>,
    first_ts: i64,
    last_ts: i64,
}

/// Derive the ordered bucket windows (major buckets ascending, then
/// recent sub-versions ascending) for a dimension's observed versions.
pub fn bucket_windows(
    spans: &[VersionSpan],
    current_version: &Version,
    policy: &GroupingPolicy,
) -> Vec<BucketWindow> {
    let current_major = current_version.major();
    let min_major = current_major.saturating_sub(policy.lookback);

    // parseable versions inside the lookback range, in release order
    let mut ordered: Vec<(&VersionSpan, Version)> = spans
        .iter()
        .filter_map(|span| {
            Version::parse(&span.version)
                .filter(|v| v.major() >= min_major && v.major() <= current_major)
                .map(|v| (span, v))
        })
        .collect();
    ordered.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.version.cmp(&b.0.version)));
    if ordered.is_empty() {
        return Vec::new();
    }

    // group by major version; `ordered` already sorts majors ascending
    let mut majors: Vec<RawWindow> = Vec::new();
    for (span, version) in &ordered {
        let label = version.major().to_string();
        match majors.last_mut() {
            Some(group) if group.label == label => {
                group.members.push(span.version.clone());
                group.last_ts = span.last_ts;
            }
            _ => majors.push(RawWindow {
                label,
                members: vec![span.version.clone()],
                first_ts: span.first_ts,
                last_ts: span.last_ts,
            }),
        }
    }

    // the newest bucket's raw span doubles as the reference duration
    // for adjusted rates and as the clipping gate
    let newest = &majors[majors.len() - 1];
    let latest_interval = newest.last_ts - newest.first_ts;

    let mut windows = windowize(&majors, Some(latest_interval), latest_interval);

    if !policy.continuous_releases && policy.recent_subversion_count > 0 {
        let tail_start = ordered.len().saturating_sub(policy.recent_subversion_count);
        let recent: Vec<RawWindow> = ordered[tail_start..]
            .iter()
            .filter(|(_, version)| version.major() == current_major)
            .map(|(span, _)| RawWindow {
                label: span.version.clone(),
                members: vec![span.version.clone()],
                first_ts: span.first_ts,
                last_ts: span.last_ts,
            })
            .collect();
        windows.extend(windowize(&recent, None, latest_interval));
    }

    windows
}

/// Censor each window by its successor, clip rollout noise, and drop
/// degenerate windows.
fn windowize(items: &[RawWindow], reference: Option<i64>, latest_interval: i64) -> Vec<BucketWindow> {
    let mut out = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let end = match items.get(i + 1) {
            Some(next) => next.first_ts,
            None => item.last_ts,
        };
        let field_duration = end - item.first_ts;
        let adjusted_duration = reference.filter(|r| *r > 0).unwrap_or(field_duration);

        // the first day after a release is disproportionately noisy;
        // only clip once the newest version has enough history that the
        // comparison isn't starved
        let mut start = item.first_ts;
        if latest_interval > NOISE_CLIP_SECS && field_duration > NOISE_CLIP_MIN_SPAN_SECS {
            start += NOISE_CLIP_SECS;
        }

        if start >= end {
            // super-short-lived or truncated data; no honest summary
            continue;
        }

        out.push(BucketWindow {
            label: item.label.clone(),
            members: item.members.clone(),
            start,
            field_duration,
            adjusted_duration,
        });
    }
    out
}
