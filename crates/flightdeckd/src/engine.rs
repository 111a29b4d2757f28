//! Engine wiring.
//!
//! Bundles the configuration, catalog, upstream clients and the
//! summary cache behind one cloneable handle. Refreshes are spawned
//! per dimension and run independently; each task opens its own store
//! connection, so the store's row uniqueness is the only shared state.

use anyhow::{anyhow, Context, Result};
use flightdeck_common::version::Version;
use flightdeck_common::{DimensionKey, MeasureSummary};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::buildhub::BuildHubClient;
use crate::cache::SummaryCache;
use crate::catalog::Catalog;
use crate::config::Config;
use crate::feed::VersionFeed;
use crate::grouping::GroupingPolicy;
use crate::ingest::{self, IngestOptions, IngestReport};
use crate::source::SampleSource;
use crate::store::SampleStore;
use crate::summary::{self, SummaryOptions};

struct EngineInner {
    config: Config,
    catalog: Catalog,
    source: SampleSource,
    buildhub: BuildHubClient,
    feed: VersionFeed,
    cache: SummaryCache,
}

/// Cloneable handle over the engine's collaborators.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let feed = VersionFeed::new(&config.upstream)?;
        Self::with_feed(config, feed)
    }

    /// Build an engine with a caller-supplied version feed (fixed feeds
    /// keep tests and offline runs off the network).
    pub fn with_feed(config: Config, feed: VersionFeed) -> Result<Self> {
        let catalog = config.catalog();
        let source = SampleSource::new(&config.upstream)?;
        let buildhub = BuildHubClient::new(&config.upstream)?;
        let cache = SummaryCache::new(
            config.summary.cache_capacity,
            Duration::from_secs(config.summary.cache_ttl_secs),
        );
        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                catalog,
                source,
                buildhub,
                feed,
                cache,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    pub fn source(&self) -> &SampleSource {
        &self.inner.source
    }

    pub fn buildhub(&self) -> &BuildHubClient {
        &self.inner.buildhub
    }

    pub fn feed(&self) -> &VersionFeed {
        &self.inner.feed
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.inner.cache
    }

    /// Open a fresh store connection for the current task.
    pub fn store(&self) -> Result<SampleStore> {
        SampleStore::open_at(&self.inner.config.store.path)
    }

    /// Recompute one dimension's summary and overwrite its cache entry.
    /// Returns None for the explicit "no data" outcome.
    pub async fn refresh_summary(&self, dim: &DimensionKey) -> Result<Option<MeasureSummary>> {
        let channel = self
            .catalog()
            .channel(&dim.channel)
            .ok_or_else(|| anyhow!("unknown channel: {}", dim.channel))?;

        let raw_version = self
            .feed()
            .current_version(&dim.channel)
            .await
            .with_context(|| format!("published version lookup failed for {}", dim.channel))?;
        let current_version = Version::parse(&raw_version)
            .ok_or_else(|| anyhow!("unparseable published version: {}", raw_version))?;

        let opts = SummaryOptions {
            policy: GroupingPolicy {
                lookback: self
                    .catalog()
                    .version_lookback(&dim.channel, self.config().summary.version_lookback),
                recent_subversion_count: self.config().summary.recent_subversion_count,
                continuous_releases: channel.continuous_releases,
            },
            trim_quantile: self.config().summary.trim_quantile,
        };

        let store = self.store()?;
        let summary = summary::build_measure_summary(&store, dim, &current_version, &opts)?;
        if let Some(summary) = &summary {
            self.cache().put(&dim.summary_cache_key(), summary.clone());
        }
        Ok(summary)
    }

    /// Fire-and-continue summary refresh; failures are logged, never
    /// propagated to the caller.
    pub fn spawn_summary_refresh(&self, dim: DimensionKey) {
        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.refresh_summary(&dim).await {
                warn!("Summary refresh failed for {}: {:#}", dim, e);
            }
        });
    }

    /// Ingest one dimension combination.
    pub async fn refresh_dimension(
        &self,
        application: &str,
        platform: &str,
        channel: &str,
        opts: IngestOptions,
    ) -> Result<IngestReport, ingest::IngestError> {
        ingest::update_measures(self, application, platform, channel, opts).await
    }

    /// Refresh every dimension combination in the catalog, in parallel.
    /// Individual failures are logged and counted, not propagated; the
    /// external scheduler owns retries.
    pub async fn refresh_all(&self, opts: IngestOptions) -> Result<usize> {
        let combos: Vec<(String, String, String)> = self
            .catalog()
            .dimension_combinations()
            .into_iter()
            .map(|(app, platform, channel)| {
                (app.name.clone(), platform.name.clone(), channel.name.clone())
            })
            .collect();

        let mut handles = Vec::with_capacity(combos.len());
        for (application, platform, channel) in combos {
            let engine = self.clone();
            let task_opts = opts.clone();
            handles.push(tokio::spawn(async move {
                let result = engine
                    .refresh_dimension(&application, &platform, &channel, task_opts)
                    .await;
                if let Err(e) = &result {
                    warn!(
                        "Refresh failed for {}/{}/{}: {}",
                        application, platform, channel, e
                    );
                }
                result.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap_or(false) {
                succeeded += 1;
            }
        }
        Ok(succeeded)
    }
}
