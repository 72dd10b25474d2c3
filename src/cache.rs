//! Hot write-buffer interface
//!
//! Recent samples live in an in-memory buffer owned by the ingestion side
//! and are not guaranteed to have reached the Whisper files yet. The fetch
//! engine overlays them on top of disk data through this seam.

use std::collections::HashMap;
use std::sync::RwLock;

/// One buffered sample: `(timestamp_seconds, value)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HotSample {
    pub timestamp: i64,
    pub value: f64,
}

impl HotSample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Source of not-yet-flushed samples. Implementations must be thread-safe;
/// `samples_for` is called once per single-metric fetch.
pub trait HotCache: Send + Sync {
    /// Current buffered samples for a dotted metric name. Empty when the
    /// metric has nothing buffered.
    fn samples_for(&self, metric: &str) -> Vec<HotSample>;
}

/// In-memory `HotCache` backed by a locked map. Used by the binary when no
/// external buffer is wired in, and by tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    samples: RwLock<HashMap<String, Vec<HotSample>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffered samples for a metric.
    pub fn set(&self, metric: impl Into<String>, samples: Vec<HotSample>) {
        self.samples
            .write()
            .expect("hot cache lock poisoned")
            .insert(metric.into(), samples);
    }
}

impl HotCache for MemoryCache {
    fn samples_for(&self, metric: &str) -> Vec<HotSample> {
        self.samples
            .read()
            .expect("hot cache lock poisoned")
            .get(metric)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_cache_lookup() {
        let cache = MemoryCache::new();
        cache.set("a.b.c", vec![HotSample::new(100, 1.0), HotSample::new(160, 2.0)]);

        let samples = cache.samples_for("a.b.c");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], HotSample::new(100, 1.0));

        assert!(cache.samples_for("a.b.missing").is_empty());
    }

    #[test]
    fn test_set_replaces() {
        let cache = MemoryCache::new();
        cache.set("a", vec![HotSample::new(1, 1.0)]);
        cache.set("a", vec![HotSample::new(2, 2.0)]);
        assert_eq!(cache.samples_for("a"), vec![HotSample::new(2, 2.0)]);
    }
}
