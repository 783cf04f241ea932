//! Analysis result types
//!
//! Plain serde data exposed to downstream reporting and compliance tooling.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Confidence telemetry for one generated token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMetric {
    /// Zero-based position within the generated sequence.
    pub step_index: u32,
    /// Decoded text of the chosen token.
    pub token_text: String,
    /// Reciprocal of the chosen token's probability; `+inf` when the
    /// probability underflowed to zero.
    pub perplexity: f64,
    /// Shannon entropy over the top-k probability mass, natural log.
    pub top_k_entropy: f64,
    /// Probability gap between the two most likely candidates; `0.0` when
    /// fewer than two candidates were available.
    pub logit_gap: f64,
    /// Running sum of `-ln(p)` over every token so far whose probability
    /// fell below the surprise threshold. Non-decreasing across a sequence.
    pub cumulative_surprise: f64,
}

/// Aggregate quality telemetry for one full generation.
///
/// The three threshold fields echo the effective config so a stored result
/// can be audited without the config that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub model_id: String,
    pub prompt: String,
    pub generated_text: String,
    /// Per-token telemetry, ordered by step; one entry per generated token.
    pub step_metrics: Vec<StepMetric>,
    /// Average perplexity over finite-valued steps only; `+inf` when no
    /// step is finite.
    pub avg_perplexity: f64,
    /// Maximum perplexity over finite-valued steps only; `+inf` when no
    /// step is finite.
    pub max_perplexity: f64,
    pub avg_entropy: f64,
    pub max_entropy: f64,
    /// Cumulative surprise of the final step; `0.0` for empty generations.
    pub final_surprise: f64,
    pub generation_step_count: u32,
    pub perplexity_threshold: f64,
    pub entropy_threshold: f64,
    pub surprise_threshold: f64,
    pub passed_quality_check: bool,
    /// Wall-clock generation time in milliseconds.
    pub generation_ms: u64,
    /// Whether this result was produced by the CPU fallback path.
    pub from_fallback: bool,
}

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Aggregated health report: one overall status plus named sub-checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: BTreeMap<String, bool>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            model_id: "test-model".to_string(),
            prompt: "hello".to_string(),
            generated_text: "world".to_string(),
            step_metrics: vec![StepMetric {
                step_index: 0,
                token_text: "world".to_string(),
                perplexity: 1.25,
                top_k_entropy: 0.5,
                logit_gap: 0.6,
                cumulative_surprise: 0.0,
            }],
            avg_perplexity: 1.25,
            max_perplexity: 1.25,
            avg_entropy: 0.5,
            max_entropy: 0.5,
            final_surprise: 0.0,
            generation_step_count: 1,
            perplexity_threshold: 50.0,
            entropy_threshold: 3.0,
            surprise_threshold: 20.0,
            passed_quality_check: true,
            generation_ms: 12,
            from_fallback: false,
        }
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = sample_result();
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn health_report_status_accessor() {
        let report = HealthReport {
            status: HealthStatus::Healthy,
            checks: BTreeMap::from([("resource_loaded".to_string(), true)]),
        };
        assert!(report.healthy());

        let report = HealthReport { status: HealthStatus::Degraded, checks: BTreeMap::new() };
        assert!(!report.healthy());
    }
}
