//! Experiment ingestion.
//!
//! Branch-keyed variant of the measure ingestion: rows arrive keyed by
//! experiment branch instead of build, pass the same integrity rules,
//! and land in the branch sample table (unique per branch, measure and
//! timestamp). Branches are created lazily on first observation.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::info;

use crate::engine::Engine;
use crate::ingest::IngestError;
use crate::source::ExperimentRow;
use crate::store::{BranchSampleInsert, SampleStore};

/// Fetch and merge new branch rows for one experiment. Returns the
/// number of samples inserted.
pub async fn update_experiment(engine: &Engine, experiment: &str) -> Result<usize, IngestError> {
    info!("Updating experiment: {}", experiment);

    let catalog = engine.catalog();
    let measures: Vec<String> = catalog
        .experiment_measures()
        .iter()
        .map(|m| m.name.clone())
        .collect();
    if measures.is_empty() {
        return Err(IngestError::NoMeasures(
            "experiment".to_string(),
            "-".to_string(),
            experiment.to_string(),
        ));
    }

    let store = engine.store()?;

    // only fetch windows newer than what we already hold, bounded by
    // the retention horizon
    let retention_floor = Utc::now() - Duration::days(engine.config().retention.days);
    let mut min_window_start = retention_floor.timestamp();
    if let Some(newest) = store.experiment_max_timestamp(experiment)? {
        if newest > min_window_start {
            min_window_start = newest;
        }
    }
    let min_submission_date = DateTime::<Utc>::from_timestamp(min_window_start, 0)
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_default();

    let rows = engine
        .source()
        .fetch_experiment_rows(experiment, &measures, min_window_start, &min_submission_date)
        .await?;

    let inserted = merge_experiment_rows(&store, experiment, &measures, &rows)?;
    info!(
        "Merged {} branch samples for experiment {} ({} rows fetched)",
        inserted,
        experiment,
        rows.len()
    );
    Ok(inserted)
}

/// Validate branch rows and write the survivors.
pub fn merge_experiment_rows(
    store: &SampleStore,
    experiment: &str,
    measures: &[String],
    rows: &[ExperimentRow],
) -> Result<usize, IngestError> {
    let mut branch_cache: HashMap<String, i64> = HashMap::new();
    let mut inserts: Vec<BranchSampleInsert> = Vec::new();

    for row in rows {
        if row.usage_hours <= 0.0 {
            continue;
        }
        for measure in measures {
            // absent and negative counts are both dropped here
            let count = match row.measure_counts.get(measure).copied().flatten() {
                Some(count) if count >= 0.0 => count,
                _ => continue,
            };
            let branch_ref = match branch_cache.get(&row.branch) {
                Some(id) => *id,
                None => {
                    let id = store.get_or_create_branch(experiment, &row.branch)?;
                    branch_cache.insert(row.branch.clone(), id);
                    id
                }
            };
            inserts.push(BranchSampleInsert {
                branch_ref,
                measure: measure.clone(),
                timestamp: row.window_start,
                value: count,
                usage_hours: row.usage_hours,
                client_count: row.client_count,
            });
        }
    }

    Ok(store.insert_branch_samples(&inserts)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (SampleStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        (SampleStore::open_at(tmp.path()).unwrap(), tmp)
    }

    fn row(window_start: i64, branch: &str, usage_hours: f64, count: Option<f64>) -> ExperimentRow {
        ExperimentRow {
            window_start,
            branch: branch.to_string(),
            usage_hours,
            client_count: 10,
            measure_counts: [("main_crashes".to_string(), count)].into_iter().collect(),
        }
    }

    fn measures() -> Vec<String> {
        vec!["main_crashes".to_string()]
    }

    #[test]
    fn test_branches_created_lazily() {
        let (store, _tmp) = test_store();
        let rows = vec![
            row(1000, "control", 20.0, Some(3.0)),
            row(1000, "treatment", 20.0, Some(5.0)),
        ];
        let inserted =
            merge_experiment_rows(&store, "my_experiment", &measures(), &rows).unwrap();
        assert_eq!(inserted, 2);
        let samples = store
            .experiment_samples("my_experiment", "main_crashes", 0, 10_000)
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].0, "control");
        assert_eq!(samples[1].0, "treatment");
    }

    #[test]
    fn test_absent_and_negative_counts_are_dropped() {
        let (store, _tmp) = test_store();
        let rows = vec![
            row(1000, "control", 20.0, None),
            row(2000, "control", 20.0, Some(-2.0)),
            row(3000, "control", 0.0, Some(3.0)),
            row(4000, "control", 20.0, Some(3.0)),
        ];
        let inserted =
            merge_experiment_rows(&store, "my_experiment", &measures(), &rows).unwrap();
        assert_eq!(inserted, 1);
    }

    #[test]
    fn test_reingest_does_not_duplicate() {
        let (store, _tmp) = test_store();
        let rows = vec![row(1000, "control", 20.0, Some(3.0))];
        assert_eq!(
            merge_experiment_rows(&store, "my_experiment", &measures(), &rows).unwrap(),
            1
        );
        assert_eq!(
            merge_experiment_rows(&store, "my_experiment", &measures(), &rows).unwrap(),
            0
        );
    }
}
