//! Monitoring configuration

use serde::{Deserialize, Serialize};

/// Quality-gate thresholds and generation parameters for one analysis run.
///
/// Two configs are considered equivalent for caching purposes iff all
/// fields compare equal; [`MonitoringConfig::canonical_string`] provides a
/// fixed-field-order rendering so structurally equal configs always derive
/// the same cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Maximum acceptable average per-token perplexity.
    pub perplexity_threshold: f64,
    /// Maximum acceptable per-token top-k entropy.
    pub entropy_threshold: f64,
    /// Maximum acceptable cumulative surprise over the full sequence.
    pub surprise_threshold: f64,
    /// Generation length cap.
    pub max_new_tokens: u32,
    /// Sampling temperature; `0.0` selects greedy decoding.
    pub temperature: f64,
    /// Width of the entropy / logit-gap window.
    pub top_k: u32,
    /// Probability floor below which a token contributes to surprise.
    pub surprise_probability_threshold: f64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            perplexity_threshold: 50.0,
            entropy_threshold: 3.0,
            surprise_threshold: 20.0,
            max_new_tokens: 64,
            temperature: 0.0,
            top_k: 10,
            surprise_probability_threshold: 0.1,
        }
    }
}

impl MonitoringConfig {
    /// Apply per-call overrides, returning the effective config for one request.
    pub fn with_overrides(&self, max_new_tokens: Option<u32>, temperature: Option<f64>) -> Self {
        let mut effective = self.clone();
        if let Some(max) = max_new_tokens {
            effective.max_new_tokens = max;
        }
        if let Some(temp) = temperature {
            effective.temperature = temp;
        }
        effective
    }

    /// Deterministic fixed-order rendering of every field.
    ///
    /// Field order is part of the cache-key contract and must not change
    /// without invalidating existing caches.
    pub fn canonical_string(&self) -> String {
        format!(
            "entropy_threshold={};max_new_tokens={};perplexity_threshold={};\
             surprise_probability_threshold={};surprise_threshold={};temperature={};top_k={}",
            self.entropy_threshold,
            self.max_new_tokens,
            self.perplexity_threshold,
            self.surprise_probability_threshold,
            self.surprise_threshold,
            self.temperature,
            self.top_k,
        )
    }

    /// Basic sanity validation; returns a list of human-readable problems.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.perplexity_threshold <= 0.0 {
            errors.push("perplexity_threshold must be positive".to_string());
        }
        if self.entropy_threshold <= 0.0 {
            errors.push("entropy_threshold must be positive".to_string());
        }
        if self.surprise_threshold <= 0.0 {
            errors.push("surprise_threshold must be positive".to_string());
        }
        if self.max_new_tokens == 0 {
            errors.push("max_new_tokens cannot be 0".to_string());
        }
        if self.temperature < 0.0 {
            errors.push("temperature cannot be negative".to_string());
        }
        if self.top_k == 0 {
            errors.push("top_k cannot be 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.surprise_probability_threshold) {
            errors.push("surprise_probability_threshold must be in [0, 1]".to_string());
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MonitoringConfig::default().validate().is_empty());
    }

    #[test]
    fn structural_equality_ignores_construction_order() {
        let a = MonitoringConfig { temperature: 0.7, ..MonitoringConfig::default() };
        let mut b = MonitoringConfig::default();
        b.temperature = 0.7;
        assert_eq!(a, b);
        assert_eq!(a.canonical_string(), b.canonical_string());
    }

    #[test]
    fn canonical_string_differs_when_any_field_differs() {
        let base = MonitoringConfig::default();
        let variants = [
            MonitoringConfig { perplexity_threshold: 10.0, ..base.clone() },
            MonitoringConfig { entropy_threshold: 1.0, ..base.clone() },
            MonitoringConfig { surprise_threshold: 5.0, ..base.clone() },
            MonitoringConfig { max_new_tokens: 8, ..base.clone() },
            MonitoringConfig { temperature: 1.0, ..base.clone() },
            MonitoringConfig { top_k: 5, ..base.clone() },
            MonitoringConfig { surprise_probability_threshold: 0.5, ..base.clone() },
        ];
        for variant in &variants {
            assert_ne!(base.canonical_string(), variant.canonical_string());
        }
    }

    #[test]
    fn overrides_replace_only_named_fields() {
        let base = MonitoringConfig::default();
        let effective = base.with_overrides(Some(5), Some(0.9));
        assert_eq!(effective.max_new_tokens, 5);
        assert!((effective.temperature - 0.9).abs() < f64::EPSILON);
        assert!((effective.perplexity_threshold - base.perplexity_threshold).abs() < f64::EPSILON);

        let untouched = base.with_overrides(None, None);
        assert_eq!(untouched, base);
    }

    #[test]
    fn invalid_values_are_reported() {
        let config = MonitoringConfig {
            perplexity_threshold: 0.0,
            max_new_tokens: 0,
            surprise_probability_threshold: 2.0,
            ..MonitoringConfig::default()
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 3);
    }
}
