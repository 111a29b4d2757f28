//! Derived-summary cache.
//!
//! Explicit TTL'd key-value collaborator (dimension tuple -> Summary),
//! passed by handle to whoever needs it. Entries are overwritten
//! wholesale on refresh, last writer wins.

use flightdeck_common::MeasureSummary;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct CacheEntry {
    stored_at: Instant,
    summary: MeasureSummary,
}

/// Bounded, TTL'd cache of measure summaries keyed by the dimension's
/// summary cache key.
pub struct SummaryCache {
    inner: Mutex<LruCache<String, CacheEntry>>,
    ttl: Duration,
}

impl SummaryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Fresh cached summary for a key, if present.
    pub fn get(&self, key: &str) -> Option<MeasureSummary> {
        let mut cache = self.inner.lock().ok()?;
        match cache.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.summary.clone()),
            Some(_) => {
                cache.pop(key);
                None
            }
            None => None,
        }
    }

    /// Store (or overwrite) the summary for a key.
    pub fn put(&self, key: &str, summary: MeasureSummary) {
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(
                key.to_string(),
                CacheEntry {
                    stored_at: Instant::now(),
                    summary,
                },
            );
        }
    }
}
