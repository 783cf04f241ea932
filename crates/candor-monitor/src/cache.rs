//! Bounded LRU memoization of analysis results

use candor_common::{AnalysisResult, MonitoringConfig};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache key: SHA-256 over the prompt and the canonical config rendering.
///
/// Two configs with identical field values always hash identically
/// regardless of construction order, because the config contributes its
/// fixed-field-order [`MonitoringConfig::canonical_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    fn derive(prompt: &str, config: &MonitoringConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update([0x1f]);
        hasher.update(config.canonical_string().as_bytes());
        Self(hasher.finalize().into())
    }
}

/// Strict-LRU cache of `(prompt, config) -> AnalysisResult`.
///
/// A hit promotes the entry to most-recently-used; inserting into a full
/// cache evicts the least-recently-*accessed* entry. Capacity `0` disables
/// storage entirely (every lookup misses, every store is dropped), which
/// the CPU-fallback path relies on.
pub struct ResultCache {
    inner: Option<Mutex<LruCache<CacheKey, Arc<AnalysisResult>>>>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        let inner = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner }
    }

    fn lock(&self) -> Option<MutexGuard<'_, LruCache<CacheKey, Arc<AnalysisResult>>>> {
        self.inner
            .as_ref()
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Look up a previous analysis, promoting the entry on hit.
    pub fn get(&self, prompt: &str, config: &MonitoringConfig) -> Option<Arc<AnalysisResult>> {
        let key = CacheKey::derive(prompt, config);
        self.lock()?.get(&key).cloned()
    }

    /// Store an analysis, evicting the least-recently-used entry if full.
    pub fn put(&self, prompt: &str, config: &MonitoringConfig, result: Arc<AnalysisResult>) {
        let key = CacheKey::derive(prompt, config);
        if let Some(mut cache) = self.lock() {
            cache.put(key, result);
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(mut cache) = self.lock() {
            cache.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_for(prompt: &str) -> Arc<AnalysisResult> {
        Arc::new(AnalysisResult {
            model_id: "m".to_string(),
            prompt: prompt.to_string(),
            generated_text: String::new(),
            step_metrics: Vec::new(),
            avg_perplexity: 1.0,
            max_perplexity: 1.0,
            avg_entropy: 0.0,
            max_entropy: 0.0,
            final_surprise: 0.0,
            generation_step_count: 0,
            perplexity_threshold: 50.0,
            entropy_threshold: 3.0,
            surprise_threshold: 20.0,
            passed_quality_check: true,
            generation_ms: 0,
            from_fallback: false,
        })
    }

    #[test]
    fn get_returns_stored_result() {
        let cache = ResultCache::new(4);
        let config = MonitoringConfig::default();
        assert!(cache.get("p1", &config).is_none());

        cache.put("p1", &config, result_for("p1"));
        let hit = cache.get("p1", &config).unwrap();
        assert_eq!(hit.prompt, "p1");
    }

    #[test]
    fn distinct_configs_key_separately() {
        let cache = ResultCache::new(4);
        let a = MonitoringConfig::default();
        let b = MonitoringConfig { max_new_tokens: 5, ..MonitoringConfig::default() };

        cache.put("p", &a, result_for("p"));
        assert!(cache.get("p", &a).is_some());
        assert!(cache.get("p", &b).is_none());
    }

    #[test]
    fn equal_configs_key_identically() {
        let cache = ResultCache::new(4);
        let a = MonitoringConfig { temperature: 0.5, ..MonitoringConfig::default() };
        let mut b = MonitoringConfig::default();
        b.temperature = 0.5;

        cache.put("p", &a, result_for("p"));
        assert!(cache.get("p", &b).is_some());
    }

    #[test]
    fn eviction_follows_access_order_not_insertion_order() {
        let cache = ResultCache::new(2);
        let config = MonitoringConfig::default();

        cache.put("first", &config, result_for("first"));
        cache.put("second", &config, result_for("second"));

        // Touch "first" so "second" becomes least recently accessed.
        assert!(cache.get("first", &config).is_some());

        cache.put("third", &config, result_for("third"));
        assert!(cache.get("first", &config).is_some());
        assert!(cache.get("second", &config).is_none());
        assert!(cache.get("third", &config).is_some());
    }

    #[test]
    fn capacity_plus_one_evicts_exactly_one() {
        let cache = ResultCache::new(3);
        let config = MonitoringConfig::default();
        for prompt in ["a", "b", "c", "d"] {
            cache.put(prompt, &config, result_for(prompt));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a", &config).is_none());
    }

    #[test]
    fn zero_capacity_disables_storage() {
        let cache = ResultCache::new(0);
        let config = MonitoringConfig::default();
        cache.put("p", &config, result_for("p"));
        assert!(cache.get("p", &config).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = ResultCache::new(4);
        let config = MonitoringConfig::default();
        cache.put("p1", &config, result_for("p1"));
        cache.put("p2", &config, result_for("p2"));
        assert_eq!(cache.len(), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("p1", &config).is_none());
    }
}
