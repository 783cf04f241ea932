//! Metrics collection for the monitoring engine

use metrics::{counter, histogram, Counter, Histogram};
use std::time::Duration;

/// Handle-holding wrapper over the `metrics` facade.
///
/// All handles are registered up front; a disabled collector keeps every
/// method as a no-op so callers never need to branch.
pub struct MetricsCollector {
    enabled: bool,
    requests_total: Counter,
    errors_total: Counter,
    cache_hits_total: Counter,
    cache_misses_total: Counter,
    quality_passed_total: Counter,
    quality_failed_total: Counter,
    request_duration_seconds: Histogram,
    perplexity: Histogram,
    entropy: Histogram,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            requests_total: counter!("candor_requests_total"),
            errors_total: counter!("candor_errors_total"),
            cache_hits_total: counter!("candor_cache_hits_total"),
            cache_misses_total: counter!("candor_cache_misses_total"),
            quality_passed_total: counter!("candor_quality_passed_total"),
            quality_failed_total: counter!("candor_quality_failed_total"),
            request_duration_seconds: histogram!("candor_request_duration_seconds"),
            perplexity: histogram!("candor_avg_perplexity"),
            entropy: histogram!("candor_max_entropy"),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_request(&self) {
        if self.enabled {
            self.requests_total.increment(1);
        }
    }

    pub fn record_error(&self, kind: &str) {
        if self.enabled {
            self.errors_total.increment(1);
            counter!("candor_errors_by_kind_total", "kind" => kind.to_owned()).increment(1);
        }
    }

    pub fn record_cache_hit(&self) {
        if self.enabled {
            self.cache_hits_total.increment(1);
        }
    }

    pub fn record_cache_miss(&self) {
        if self.enabled {
            self.cache_misses_total.increment(1);
        }
    }

    pub fn record_quality(&self, passed: bool) {
        if self.enabled {
            if passed {
                self.quality_passed_total.increment(1);
            } else {
                self.quality_failed_total.increment(1);
            }
        }
    }

    pub fn observe_duration(&self, duration: Duration) {
        if self.enabled {
            self.request_duration_seconds.record(duration.as_secs_f64());
        }
    }

    /// Record an average-perplexity observation; infinite values are
    /// dropped rather than poisoning the histogram.
    pub fn observe_perplexity(&self, value: f64) {
        if self.enabled && value.is_finite() {
            self.perplexity.record(value);
        }
    }

    pub fn observe_entropy(&self, value: f64) {
        if self.enabled && value.is_finite() {
            self.entropy.record(value);
        }
    }
}
