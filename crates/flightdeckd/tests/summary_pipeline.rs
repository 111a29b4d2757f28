//! End-to-end tests of the merge -> group -> summarize pipeline and
//! the summary cache read-through.

use flightdeck_common::DimensionKey;
use flightdeckd::config::Config;
use flightdeckd::engine::Engine;
use flightdeckd::feed::VersionFeed;
use flightdeckd::ingest::merge_rows;
use flightdeckd::service::{self, SummaryParams};
use flightdeckd::source::SourceRow;
use flightdeckd::store::BuildRecord;
use tempfile::TempDir;

const HOUR: i64 = 3600;

fn test_engine(versions: &[(&str, &str)]) -> (Engine, TempDir) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.store.path = dir.path().join("samples.db");
    let feed = VersionFeed::fixed(
        versions
            .iter()
            .map(|(channel, version)| (channel.to_string(), version.to_string()))
            .collect(),
    );
    let engine = Engine::with_feed(config, feed).unwrap();
    (engine, dir)
}

fn register_build(engine: &Engine, channel: &str, build_id: &str, version: &str) {
    engine
        .store()
        .unwrap()
        .upsert_build(&BuildRecord {
            application: "firefox".to_string(),
            platform: "linux".to_string(),
            channel: channel.to_string(),
            build_id: build_id.to_string(),
            version: version.to_string(),
        })
        .unwrap();
}

fn source_row(window_start: i64, build_id: &str, version: &str, usage_hours: f64, count: f64) -> SourceRow {
    SourceRow {
        window_start,
        build_id: build_id.to_string(),
        display_version: version.to_string(),
        usage_hours,
        client_count: 100,
        measure_counts: [("main_crashes".to_string(), Some(count))]
            .into_iter()
            .collect(),
    }
}

fn summary_params() -> SummaryParams {
    SummaryParams {
        application: Some("firefox".to_string()),
        platform: Some("linux".to_string()),
        channel: Some("release".to_string()),
        measure: Some("main_crashes".to_string()),
    }
}

#[tokio::test]
async fn test_merge_then_summarize() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    register_build(&engine, "release", "20170629075044", "55.0");

    let rows = vec![
        source_row(0, "20170629075044", "55.0", 20.0, 100.0),
        source_row(300, "20170629075044", "55.0", 16.0, 10.0),
        source_row(600, "20170629075044", "55.0", 20.0, 10.0),
    ];
    let store = engine.store().unwrap();
    let measures = vec!["main_crashes".to_string()];
    let report = merge_rows(&store, "linux", "release", &measures, None, &rows, true).unwrap();
    assert_eq!(report.inserted, 3);

    let summary = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .expect("summary should exist after merge");

    // newest first: the 55.0 sub-version record, then the 55 bucket
    let labels: Vec<_> = summary.versions.iter().map(|v| v.version.clone()).collect();
    assert_eq!(labels, vec!["55.0", "55"]);
    let bucket = summary.versions.iter().find(|v| v.version == "55").unwrap();
    assert_eq!(bucket.count, Some(120));
    assert_eq!(bucket.field_duration, 600);
    assert!(bucket.rate.unwrap() >= 0.0);
    assert_eq!(summary.last_updated.timestamp(), 600);
}

#[tokio::test]
async fn test_summary_orders_newest_version_first() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    register_build(&engine, "release", "20170501000000", "54.0");
    register_build(&engine, "release", "20170629075044", "55.0");

    let store = engine.store().unwrap();
    let measures = vec!["main_crashes".to_string()];
    let rows = vec![
        source_row(0, "20170501000000", "54.0", 10.0, 1.0),
        source_row(10 * HOUR, "20170501000000", "54.0", 10.0, 1.0),
        source_row(10 * HOUR, "20170629075044", "55.0", 10.0, 2.0),
        source_row(12 * HOUR, "20170629075044", "55.0", 10.0, 2.0),
    ];
    merge_rows(&store, "linux", "release", &measures, None, &rows, true).unwrap();

    let summary = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .unwrap();
    let labels: Vec<_> = summary.versions.iter().map(|v| v.version.clone()).collect();
    assert_eq!(labels, vec!["55.0", "55", "54"]);
    for record in &summary.versions {
        if let Some(rate) = record.rate {
            assert!(rate >= 0.0);
        }
    }
}

#[tokio::test]
async fn test_no_data_is_not_an_error() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    let summary = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap();
    assert!(summary.is_none());
}

#[tokio::test]
async fn test_summary_cache_read_through() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    register_build(&engine, "release", "20170629075044", "55.0");

    let store = engine.store().unwrap();
    let measures = vec!["main_crashes".to_string()];
    let rows = vec![
        source_row(0, "20170629075044", "55.0", 20.0, 100.0),
        source_row(600, "20170629075044", "55.0", 20.0, 10.0),
    ];
    merge_rows(&store, "linux", "release", &measures, None, &rows, true).unwrap();

    let first = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .unwrap();

    // new samples land, but the cached artifact answers until the next
    // refresh overwrites it
    let more = vec![source_row(1200, "20170629075044", "55.0", 20.0, 10.0)];
    merge_rows(&store, "linux", "release", &measures, None, &more, true).unwrap();
    let second = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, second);

    // an explicit refresh rebuilds the summary wholesale
    let dim = DimensionKey::new("firefox", "linux", "release", "main_crashes");
    let refreshed = engine.refresh_summary(&dim).await.unwrap().unwrap();
    assert_eq!(refreshed.last_updated.timestamp(), 1200);
    let third = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(third, refreshed);
}

#[tokio::test]
async fn test_count_total_survives_rate_trimming() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    register_build(&engine, "release", "20170629075044", "55.0");

    let store = engine.store().unwrap();
    let measures = vec!["main_crashes".to_string()];
    // 999 typical rows plus one implausible spike
    let mut rows: Vec<SourceRow> = (0..999)
        .map(|i| source_row(i * 60, "20170629075044", "55.0", 10.0, 1.0))
        .collect();
    rows.push(source_row(999 * 60, "20170629075044", "55.0", 0.001, 50_000.0));
    merge_rows(&store, "linux", "release", &measures, None, &rows, true).unwrap();

    let summary = service::measure_summary(&engine, &summary_params())
        .await
        .unwrap()
        .unwrap();
    let bucket = summary.versions.iter().find(|v| v.version == "55").unwrap();
    // the count keeps every sample
    assert_eq!(bucket.count, Some(50_999));
    // the rate dropped the spike: 999 values over 9.99k usage-hours
    assert!((bucket.rate.unwrap() - 100.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_dimension_is_rejected() {
    let (engine, _dir) = test_engine(&[("release", "55.0")]);
    let params = SummaryParams {
        measure: Some("not_a_measure".to_string()),
        ..summary_params()
    };
    let result = service::measure_summary(&engine, &params).await;
    assert!(matches!(
        result,
        Err(flightdeckd::service::QueryError::UnknownDimension(_))
    ));
}
