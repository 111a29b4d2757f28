//! SQLite-backed sample store.
//!
//! Durable home of the build registry and the per-build (and
//! per-experiment-branch) sample time series. One row per
//! (series, timestamp); UNIQUE constraints are the store's only
//! concurrency guarantee, turning duplicate ingestion into a skip.
//!
//! Connections are cheap to open; concurrent refresh tasks each open
//! their own handle (WAL mode).

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;

/// A released build as recorded by the build registry.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRecord {
    pub application: String,
    pub platform: String,
    pub channel: String,
    pub build_id: String,
    pub version: String,
}

/// One sample row ready for insertion.
#[derive(Debug, Clone)]
pub struct SampleInsert {
    pub build_ref: i64,
    pub measure: String,
    pub timestamp: i64,
    pub value: f64,
    pub usage_hours: f64,
    pub client_count: i64,
}

/// One branch-keyed sample row ready for insertion.
#[derive(Debug, Clone)]
pub struct BranchSampleInsert {
    pub branch_ref: i64,
    pub measure: String,
    pub timestamp: i64,
    pub value: f64,
    pub usage_hours: f64,
    pub client_count: i64,
}

/// A distinct observed version with its first/last sample timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionSpan {
    pub version: String,
    pub first_ts: i64,
    pub last_ts: i64,
}

/// A raw sample attributed to its build, for the alignment queries.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSample {
    pub build_id: String,
    pub version: String,
    pub timestamp: i64,
    pub value: f64,
    pub usage_hours: f64,
}

/// The sample store handle.
pub struct SampleStore {
    conn: Connection,
}

impl SampleStore {
    /// Open (and if necessary create) the store at a path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;

        // WAL so refresh tasks and read queries can share the file
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS build (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application TEXT NOT NULL,
                platform TEXT NOT NULL,
                channel TEXT NOT NULL,
                build_id TEXT NOT NULL,
                version TEXT NOT NULL,
                UNIQUE(platform, channel, build_id, version)
            );

            CREATE INDEX IF NOT EXISTS idx_build_dimension
                ON build(application, platform, channel, build_id);

            CREATE TABLE IF NOT EXISTS sample (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                build_ref INTEGER NOT NULL REFERENCES build(id),
                measure TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                value REAL NOT NULL,
                usage_hours REAL NOT NULL,
                client_count INTEGER NOT NULL,
                UNIQUE(build_ref, measure, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_sample_measure_time
                ON sample(measure, timestamp);

            CREATE TABLE IF NOT EXISTS experiment_branch (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                experiment TEXT NOT NULL,
                branch TEXT NOT NULL,
                UNIQUE(experiment, branch)
            );

            CREATE TABLE IF NOT EXISTS branch_sample (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                branch_ref INTEGER NOT NULL REFERENCES experiment_branch(id),
                measure TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                value REAL NOT NULL,
                usage_hours REAL NOT NULL,
                client_count INTEGER NOT NULL,
                UNIQUE(branch_ref, measure, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_branch_sample_measure_time
                ON branch_sample(measure, timestamp);
            "#,
        )?;

        Ok(Self { conn })
    }

    // ------------------------------------------------------------------
    // build registry
    // ------------------------------------------------------------------

    /// Record a released build. Returns true if the build was new.
    pub fn upsert_build(&self, build: &BuildRecord) -> Result<bool> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO build (application, platform, channel, build_id, version)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &build.application,
                &build.platform,
                &build.channel,
                &build.build_id,
                &build.version
            ],
        )?;
        Ok(changed > 0)
    }

    /// Row id of a recorded build, or None if it was never released.
    pub fn build_ref(
        &self,
        platform: &str,
        channel: &str,
        build_id: &str,
        version: &str,
    ) -> Result<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM build
                 WHERE platform = ?1 AND channel = ?2 AND build_id = ?3 AND version = ?4",
                params![platform, channel, build_id, version],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Distinct versions released in a build-id window (inclusive).
    pub fn versions_in_buildid_range(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        min_build_id: &str,
        max_build_id: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT version FROM build
             WHERE application = ?1 AND platform = ?2 AND channel = ?3
               AND build_id >= ?4 AND build_id <= ?5",
        )?;
        let rows = stmt.query_map(
            params![application, platform, channel, min_build_id, max_build_id],
            |row| row.get(0),
        )?;
        let mut versions = Vec::new();
        for row in rows {
            versions.push(row?);
        }
        Ok(versions)
    }

    /// Newest known build id for a dimension combination.
    pub fn newest_build_id(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
    ) -> Result<Option<String>> {
        let newest = self
            .conn
            .query_row(
                "SELECT build_id FROM build
                 WHERE application = ?1 AND platform = ?2 AND channel = ?3
                 ORDER BY build_id DESC LIMIT 1",
                params![application, platform, channel],
                |row| row.get(0),
            )
            .optional()?;
        Ok(newest)
    }

    // ------------------------------------------------------------------
    // sample ingestion
    // ------------------------------------------------------------------

    /// Insert samples in one transaction. Fails wholesale on a
    /// duplicate; callers use this for windows known to contain only
    /// new data.
    pub fn insert_samples_bulk(&self, samples: &[SampleInsert]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sample (build_ref, measure, timestamp, value, usage_hours, client_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for sample in samples {
                stmt.execute(params![
                    sample.build_ref,
                    &sample.measure,
                    sample.timestamp,
                    sample.value,
                    sample.usage_hours,
                    sample.client_count
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Insert samples one at a time, skipping rows that already exist.
    /// Returns the number actually inserted. Used for backfill over
    /// ranges that may overlap previously-ingested data.
    pub fn insert_samples_safe(&self, samples: &[SampleInsert]) -> Result<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO sample (build_ref, measure, timestamp, value, usage_hours, client_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut inserted = 0;
        for sample in samples {
            inserted += stmt.execute(params![
                sample.build_ref,
                &sample.measure,
                sample.timestamp,
                sample.value,
                sample.usage_hours,
                sample.client_count
            ])?;
        }
        Ok(inserted)
    }

    /// Newest sample timestamp at or after `since` across a set of
    /// measures, used to advance the incremental-refresh floor.
    pub fn max_sample_timestamp_since(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measures: &[String],
        since: i64,
    ) -> Result<Option<i64>> {
        if measures.is_empty() {
            return Ok(None);
        }
        let placeholders = vec!["?"; measures.len()].join(", ");
        let sql = format!(
            "SELECT MAX(s.timestamp) FROM sample s
             JOIN build b ON b.id = s.build_ref
             WHERE b.application = ? AND b.platform = ? AND b.channel = ?
               AND s.timestamp >= ? AND s.measure IN ({placeholders})"
        );
        let mut bind: Vec<Value> = vec![
            application.to_string().into(),
            platform.to_string().into(),
            channel.to_string().into(),
            since.into(),
        ];
        bind.extend(measures.iter().map(|m| Value::from(m.clone())));
        let max: Option<i64> = self
            .conn
            .query_row(&sql, params_from_iter(bind), |row| row.get(0))?;
        Ok(max)
    }

    // ------------------------------------------------------------------
    // summarization queries
    // ------------------------------------------------------------------

    /// Distinct versions observed for a dimension, each with its
    /// first/last sample timestamp.
    pub fn version_spans(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
    ) -> Result<Vec<VersionSpan>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.version, MIN(s.timestamp), MAX(s.timestamp)
             FROM sample s JOIN build b ON b.id = s.build_ref
             WHERE b.application = ?1 AND b.platform = ?2 AND b.channel = ?3
               AND s.measure = ?4
             GROUP BY b.version",
        )?;
        let rows = stmt.query_map(params![application, platform, channel, measure], |row| {
            Ok(VersionSpan {
                version: row.get(0)?,
                first_ts: row.get(1)?,
                last_ts: row.get(2)?,
            })
        })?;
        let mut spans = Vec::new();
        for row in rows {
            spans.push(row?);
        }
        Ok(spans)
    }

    /// All (value, usage_hours) pairs for a set of versions whose
    /// timestamp falls in [start, end] (inclusive, matching the
    /// summary integration windows).
    pub fn samples_for_versions(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
        versions: &[String],
        start: i64,
        end: i64,
    ) -> Result<Vec<(f64, f64)>> {
        if versions.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; versions.len()].join(", ");
        let sql = format!(
            "SELECT s.value, s.usage_hours
             FROM sample s JOIN build b ON b.id = s.build_ref
             WHERE b.application = ? AND b.platform = ? AND b.channel = ?
               AND s.measure = ? AND s.timestamp BETWEEN ? AND ?
               AND b.version IN ({placeholders})"
        );
        let mut bind: Vec<Value> = vec![
            application.to_string().into(),
            platform.to_string().into(),
            channel.to_string().into(),
            measure.to_string().into(),
            start.into(),
            end.into(),
        ];
        bind.extend(versions.iter().map(|v| Value::from(v.clone())));
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(bind), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            pairs.push(row?);
        }
        Ok(pairs)
    }

    /// Newest sample timestamp for a dimension, if any.
    pub fn dimension_max_timestamp(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
    ) -> Result<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(s.timestamp) FROM sample s
             JOIN build b ON b.id = s.build_ref
             WHERE b.application = ?1 AND b.platform = ?2 AND b.channel = ?3
               AND s.measure = ?4",
            params![application, platform, channel, measure],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Whether the dimension has any samples at all.
    pub fn dimension_has_data(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
    ) -> Result<bool> {
        Ok(self
            .dimension_max_timestamp(application, platform, channel, measure)?
            .is_some())
    }

    // ------------------------------------------------------------------
    // alignment queries
    // ------------------------------------------------------------------

    /// Raw samples in [start, end] attributed to their builds, ordered
    /// by build id then timestamp.
    pub fn samples_by_build(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<BuildSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.build_id, b.version, s.timestamp, s.value, s.usage_hours
             FROM sample s JOIN build b ON b.id = s.build_ref
             WHERE b.application = ?1 AND b.platform = ?2 AND b.channel = ?3
               AND s.measure = ?4 AND s.timestamp BETWEEN ?5 AND ?6
             ORDER BY b.build_id, s.timestamp",
        )?;
        let rows = stmt.query_map(
            params![application, platform, channel, measure, start, end],
            |row| {
                Ok(BuildSample {
                    build_id: row.get(0)?,
                    version: row.get(1)?,
                    timestamp: row.get(2)?,
                    value: row.get(3)?,
                    usage_hours: row.get(4)?,
                })
            },
        )?;
        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// Ascending (timestamp, value, usage_hours) triples for one exact
    /// version.
    pub fn samples_for_version(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
        version: &str,
    ) -> Result<Vec<(i64, f64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.timestamp, s.value, s.usage_hours
             FROM sample s JOIN build b ON b.id = s.build_ref
             WHERE b.application = ?1 AND b.platform = ?2 AND b.channel = ?3
               AND s.measure = ?4 AND b.version = ?5
             ORDER BY s.timestamp",
        )?;
        let rows = stmt.query_map(
            params![application, platform, channel, measure, version],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    /// The build with the newest sample for a dimension, as
    /// (build_id, version).
    pub fn most_recent_build(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        measure: &str,
    ) -> Result<Option<(String, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT b.build_id, b.version
                 FROM sample s JOIN build b ON b.id = s.build_ref
                 WHERE b.application = ?1 AND b.platform = ?2 AND b.channel = ?3
                   AND s.measure = ?4
                 ORDER BY s.timestamp DESC, b.build_id DESC LIMIT 1",
                params![application, platform, channel, measure],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(result)
    }

    // ------------------------------------------------------------------
    // experiment branches
    // ------------------------------------------------------------------

    /// Branch row id, creating the branch on first observation.
    pub fn get_or_create_branch(&self, experiment: &str, branch: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO experiment_branch (experiment, branch) VALUES (?1, ?2)",
            params![experiment, branch],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM experiment_branch WHERE experiment = ?1 AND branch = ?2",
            params![experiment, branch],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Bulk-insert branch samples, skipping rows that already exist.
    pub fn insert_branch_samples(&self, samples: &[BranchSampleInsert]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO branch_sample
                 (branch_ref, measure, timestamp, value, usage_hours, client_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for sample in samples {
                inserted += stmt.execute(params![
                    sample.branch_ref,
                    &sample.measure,
                    sample.timestamp,
                    sample.value,
                    sample.usage_hours,
                    sample.client_count
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Newest branch-sample timestamp for an experiment.
    pub fn experiment_max_timestamp(&self, experiment: &str) -> Result<Option<i64>> {
        let max: Option<i64> = self.conn.query_row(
            "SELECT MAX(s.timestamp) FROM branch_sample s
             JOIN experiment_branch eb ON eb.id = s.branch_ref
             WHERE eb.experiment = ?1",
            params![experiment],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Branch-keyed samples for one experiment measure in [start, end],
    /// ordered by branch then timestamp.
    pub fn experiment_samples(
        &self,
        experiment: &str,
        measure: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<(String, i64, f64, f64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT eb.branch, s.timestamp, s.value, s.usage_hours
             FROM branch_sample s JOIN experiment_branch eb ON eb.id = s.branch_ref
             WHERE eb.experiment = ?1 AND s.measure = ?2
               AND s.timestamp BETWEEN ?3 AND ?4
             ORDER BY eb.branch, s.timestamp",
        )?;
        let rows = stmt.query_map(params![experiment, measure, start, end], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;
        let mut samples = Vec::new();
        for row in rows {
            samples.push(row?);
        }
        Ok(samples)
    }

    // ------------------------------------------------------------------
    // maintenance
    // ------------------------------------------------------------------

    /// Delete samples (build- and branch-keyed) older than `cutoff`.
    /// Returns (samples, branch samples) deleted.
    pub fn prune_older_than(&self, cutoff: i64) -> Result<(u64, u64)> {
        let samples = self
            .conn
            .execute("DELETE FROM sample WHERE timestamp < ?1", params![cutoff])?;
        let branch_samples = self.conn.execute(
            "DELETE FROM branch_sample WHERE timestamp < ?1",
            params![cutoff],
        )?;
        self.conn.execute_batch("VACUUM;")?;
        Ok((samples as u64, branch_samples as u64))
    }

    /// Total stored sample count (build-keyed).
    pub fn total_sample_count(&self) -> Result<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM sample", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn test_store() -> (SampleStore, NamedTempFile) {
        let tmp = NamedTempFile::new().unwrap();
        let store = SampleStore::open_at(tmp.path()).unwrap();
        (store, tmp)
    }

    fn make_build(store: &SampleStore, build_id: &str, version: &str) -> i64 {
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

    fn sample(build_ref: i64, ts: i64, value: f64, usage_hours: f64) -> SampleInsert {
        SampleInsert {
            build_ref,
            measure: "main_crashes".to_string(),
            timestamp: ts,
            value,
            usage_hours,
            client_count: 100,
        }
    }

    #[test]
    fn test_build_upsert_is_idempotent() {
        let (store, _tmp) = test_store();
        let record = BuildRecord {
            application: "firefox".to_string(),
            platform: "linux".to_string(),
            channel: "release".to_string(),
            build_id: "20170629075044".to_string(),
            version: "55.0".to_string(),
        };
        assert!(store.upsert_build(&record).unwrap());
        assert!(!store.upsert_build(&record).unwrap());
        assert!(store
            .build_ref("linux", "release", "20170629075044", "55.0")
            .unwrap()
            .is_some());
        assert!(store
            .build_ref("linux", "release", "20170629075044", "56.0")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_bulk_insert_rejects_duplicates() {
        let (store, _tmp) = test_store();
        let build = make_build(&store, "20170629075044", "55.0");
        store
            .insert_samples_bulk(&[sample(build, 1000, 1.0, 10.0)])
            .unwrap();
        // same (build, measure, timestamp) again: the whole bulk call fails
        assert!(store
            .insert_samples_bulk(&[sample(build, 1000, 2.0, 20.0)])
            .is_err());
        assert_eq!(store.total_sample_count().unwrap(), 1);
    }

    #[test]
    fn test_safe_insert_skips_duplicates() {
        let (store, _tmp) = test_store();
        let build = make_build(&store, "20170629075044", "55.0");
        let rows = vec![sample(build, 1000, 1.0, 10.0), sample(build, 2000, 2.0, 10.0)];
        assert_eq!(store.insert_samples_safe(&rows).unwrap(), 2);
        // re-ingesting the same window inserts nothing new
        assert_eq!(store.insert_samples_safe(&rows).unwrap(), 0);
        assert_eq!(store.total_sample_count().unwrap(), 2);
    }

    #[test]
    fn test_version_spans_group_by_version() {
        let (store, _tmp) = test_store();
        let b1 = make_build(&store, "20170629075044", "55.0");
        let b2 = make_build(&store, "20170701075044", "55.0.1");
        store
            .insert_samples_bulk(&[
                sample(b1, 1000, 1.0, 10.0),
                sample(b1, 4000, 1.0, 10.0),
                sample(b2, 5000, 1.0, 10.0),
            ])
            .unwrap();
        let mut spans = store
            .version_spans("firefox", "linux", "release", "main_crashes")
            .unwrap();
        spans.sort_by(|a, b| a.version.cmp(&b.version));
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].version, "55.0");
        assert_eq!(spans[0].first_ts, 1000);
        assert_eq!(spans[0].last_ts, 4000);
        assert_eq!(spans[1].version, "55.0.1");
    }

    #[test]
    fn test_samples_for_versions_window_is_inclusive() {
        let (store, _tmp) = test_store();
        let build = make_build(&store, "20170629075044", "55.0");
        store
            .insert_samples_bulk(&[
                sample(build, 1000, 1.0, 10.0),
                sample(build, 2000, 2.0, 10.0),
                sample(build, 3000, 3.0, 10.0),
            ])
            .unwrap();
        let pairs = store
            .samples_for_versions(
                "firefox",
                "linux",
                "release",
                "main_crashes",
                &["55.0".to_string()],
                1000,
                2000,
            )
            .unwrap();
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn test_most_recent_build_follows_sample_time() {
        let (store, _tmp) = test_store();
        let b1 = make_build(&store, "20170629075044", "55.0");
        let b2 = make_build(&store, "20170601075044", "54.0");
        // the older build has the newer sample
        store
            .insert_samples_bulk(&[sample(b1, 1000, 1.0, 10.0), sample(b2, 9000, 1.0, 10.0)])
            .unwrap();
        let (build_id, version) = store
            .most_recent_build("firefox", "linux", "release", "main_crashes")
            .unwrap()
            .unwrap();
        assert_eq!(build_id, "20170601075044");
        assert_eq!(version, "54.0");
    }

    #[test]
    fn test_branch_samples_unique_per_timestamp() {
        let (store, _tmp) = test_store();
        let branch = store.get_or_create_branch("my_experiment", "control").unwrap();
        assert_eq!(
            store.get_or_create_branch("my_experiment", "control").unwrap(),
            branch
        );
        let rows = vec![BranchSampleInsert {
            branch_ref: branch,
            measure: "main_crashes".to_string(),
            timestamp: 1000,
            value: 5.0,
            usage_hours: 10.0,
            client_count: 50,
        }];
        assert_eq!(store.insert_branch_samples(&rows).unwrap(), 1);
        assert_eq!(store.insert_branch_samples(&rows).unwrap(), 0);
    }

    #[test]
    fn test_prune_deletes_strictly_older() {
        let (store, _tmp) = test_store();
        let build = make_build(&store, "20170629075044", "55.0");
        store
            .insert_samples_bulk(&[
                sample(build, 1000, 1.0, 10.0),
                sample(build, 2000, 2.0, 10.0),
            ])
            .unwrap();
        let (deleted, _) = store.prune_older_than(2000).unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.total_sample_count().unwrap(), 1);
    }

    #[test]
    fn test_versions_in_buildid_range() {
        let (store, _tmp) = test_store();
        make_build(&store, "20170601000000", "54.0");
        make_build(&store, "20170629075044", "55.0");
        make_build(&store, "20170730000000", "56.0");
        let versions = store
            .versions_in_buildid_range("firefox", "linux", "release", "20170610", "20170720")
            .unwrap();
        assert_eq!(versions, vec!["55.0".to_string()]);
    }
}
