//! Monitoring engine: orchestrates one analysis request
//!
//! Pipeline per request: validate → cache lookup → health check → generate
//! with deadline → per-step metric computation → threshold decision →
//! cache store → metrics/log emission. Accelerator exhaustion during
//! generation is recovered locally by retrying the whole pipeline on a
//! short-lived CPU resource with caching disabled.

use crate::cache::ResultCache;
use crate::metrics::MetricsCollector;
use candor_common::{
    AnalysisError, AnalysisOutcome, AnalysisResult, MonitoringConfig, ResourceError, StepMetric,
};
use candor_inference::{
    Device, DeviceSpec, GenerationParams, GenerationResource, ManagedResource, ResourceGuard,
    StepDistribution,
};
use candor_logits::shannon_entropy;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Engine construction options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Default thresholds and generation parameters.
    pub config: MonitoringConfig,
    /// Prompt length guard, in characters.
    pub max_prompt_chars: usize,
    /// Result cache capacity; `0` disables caching.
    pub cache_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { config: MonitoringConfig::default(), max_prompt_chars: 8192, cache_capacity: 128 }
    }
}

/// Orchestrator for analysis requests against one generation resource.
pub struct MonitoringEngine {
    resource: Arc<GenerationResource>,
    defaults: MonitoringConfig,
    max_prompt_chars: usize,
    cache: ResultCache,
    metrics: Arc<MetricsCollector>,
    /// Set on the short-lived CPU engine: disables further fallback and
    /// stamps results as fallback-produced.
    is_fallback: bool,
}

impl MonitoringEngine {
    pub fn new(
        resource: Arc<GenerationResource>,
        options: EngineOptions,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            resource,
            defaults: options.config,
            max_prompt_chars: options.max_prompt_chars,
            cache: ResultCache::new(options.cache_capacity),
            metrics,
            is_fallback: false,
        }
    }

    fn fallback(
        resource: Arc<GenerationResource>,
        config: MonitoringConfig,
        max_prompt_chars: usize,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            resource,
            defaults: config,
            max_prompt_chars,
            cache: ResultCache::new(0),
            metrics,
            is_fallback: true,
        }
    }

    pub fn resource(&self) -> &Arc<GenerationResource> {
        &self.resource
    }

    pub fn defaults(&self) -> &MonitoringConfig {
        &self.defaults
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Analyze one prompt: generate, score every token, and gate the
    /// result against the effective thresholds.
    ///
    /// Per-call overrides replace the engine defaults for this call only
    /// and participate in the cache key. Validation and health failures
    /// return before any generation work happens.
    pub fn analyze(
        &self,
        prompt: &str,
        timeout: Duration,
        max_new_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> AnalysisOutcome {
        // The CPU-fallback rerun is the same logical request; counting it
        // again would double requests and record a guaranteed miss against
        // the disabled cache.
        if !self.is_fallback {
            self.metrics.record_request();
        }

        if prompt.trim().is_empty() {
            return Err(AnalysisError::InvalidInput {
                message: "prompt is empty or whitespace".to_string(),
            });
        }
        let length = prompt.chars().count();
        if length > self.max_prompt_chars {
            return Err(AnalysisError::PromptTooLong { length, limit: self.max_prompt_chars });
        }

        let effective = self.defaults.with_overrides(max_new_tokens, temperature);

        if let Some(hit) = self.cache.get(prompt, &effective) {
            self.metrics.record_cache_hit();
            debug!(model_id = %self.resource.model_id(), "analysis served from cache");
            return Ok((*hit).clone());
        }
        if !self.is_fallback {
            self.metrics.record_cache_miss();
        }

        if !self.resource.health_check() {
            return Err(AnalysisError::ResourceNotLoaded {
                message: format!("model {} is not loaded", self.resource.model_id()),
            });
        }

        let start = Instant::now();
        let params = GenerationParams {
            max_new_tokens: effective.max_new_tokens,
            temperature: effective.temperature,
            top_k: effective.top_k,
            seed: None,
            deadline: Some(start + timeout),
        };

        let trace = match self.resource.generate(prompt, &params) {
            Ok(trace) => trace,
            Err(ResourceError::DeadlineExceeded { .. }) => {
                self.metrics.record_error("generation_timeout");
                return Err(AnalysisError::GenerationTimeout { elapsed: start.elapsed(), timeout });
            }
            Err(ResourceError::AcceleratorExhausted { detail }) => {
                if self.is_fallback {
                    return Err(AnalysisError::AcceleratorExhausted { detail });
                }
                return self.retry_on_cpu(prompt, timeout, &effective, &detail);
            }
            Err(ResourceError::NotLoaded) => {
                return Err(AnalysisError::ResourceNotLoaded {
                    message: format!("model {} unloaded mid-request", self.resource.model_id()),
                });
            }
            Err(other) => {
                self.metrics.record_error("unexpected");
                return Err(AnalysisError::Unexpected { message: other.to_string() });
            }
        };

        let elapsed = start.elapsed();
        if elapsed > timeout {
            self.metrics.record_error("generation_timeout");
            return Err(AnalysisError::GenerationTimeout { elapsed, timeout });
        }

        let step_metrics = compute_step_metrics(&trace.steps, &effective);
        let aggregates = aggregate(&step_metrics);
        let passed = aggregates.avg_perplexity < effective.perplexity_threshold
            && aggregates.max_entropy < effective.entropy_threshold
            && aggregates.final_surprise < effective.surprise_threshold;

        #[allow(clippy::cast_possible_truncation)]
        let result = AnalysisResult {
            model_id: self.resource.model_id().to_string(),
            prompt: prompt.to_string(),
            generated_text: trace.text,
            generation_step_count: step_metrics.len() as u32,
            step_metrics,
            avg_perplexity: aggregates.avg_perplexity,
            max_perplexity: aggregates.max_perplexity,
            avg_entropy: aggregates.avg_entropy,
            max_entropy: aggregates.max_entropy,
            final_surprise: aggregates.final_surprise,
            perplexity_threshold: effective.perplexity_threshold,
            entropy_threshold: effective.entropy_threshold,
            surprise_threshold: effective.surprise_threshold,
            passed_quality_check: passed,
            generation_ms: elapsed.as_millis() as u64,
            from_fallback: self.is_fallback,
        };

        self.cache.put(prompt, &effective, Arc::new(result.clone()));

        self.metrics.observe_duration(elapsed);
        self.metrics.record_quality(passed);
        self.metrics.observe_perplexity(result.avg_perplexity);
        self.metrics.observe_entropy(result.max_entropy);

        info!(
            model_id = %result.model_id,
            steps = result.generation_step_count,
            passed = result.passed_quality_check,
            avg_perplexity = result.avg_perplexity,
            max_entropy = result.max_entropy,
            final_surprise = result.final_surprise,
            elapsed_ms = result.generation_ms,
            fallback = result.from_fallback,
            "analysis complete"
        );

        Ok(result)
    }

    /// Accelerator exhaustion recovery: rebuild the pipeline on a
    /// short-lived CPU resource and rerun the request there. The CPU
    /// engine uses a zero-capacity cache, so nothing from this path is
    /// memoized.
    fn retry_on_cpu(
        &self,
        prompt: &str,
        timeout: Duration,
        effective: &MonitoringConfig,
        detail: &str,
    ) -> AnalysisOutcome {
        warn!(
            model_id = %self.resource.model_id(),
            detail,
            "accelerator exhausted, retrying on cpu"
        );
        self.metrics.record_error("accelerator_exhausted");

        let cpu = Arc::new(GenerationResource::new(
            self.resource.model_id(),
            DeviceSpec::for_device(Device::Cpu, None),
            self.resource.loader().clone(),
        ));
        let _guard = ResourceGuard::new(cpu.clone());

        if let Err(err) = cpu.load() {
            self.metrics.record_error("fallback_failed");
            return Err(AnalysisError::FallbackFailed {
                detail: format!("{detail}; cpu load failed: {err}"),
            });
        }

        let fallback = MonitoringEngine::fallback(
            cpu,
            effective.clone(),
            self.max_prompt_chars,
            self.metrics.clone(),
        );

        fallback.analyze(prompt, timeout, None, None).map_err(|err| {
            self.metrics.record_error("fallback_failed");
            AnalysisError::FallbackFailed { detail: format!("{detail}; cpu retry failed: {err}") }
        })
    }
}

/// Per-token telemetry from the raw probability snapshots.
pub(crate) fn compute_step_metrics(
    steps: &[StepDistribution],
    config: &MonitoringConfig,
) -> Vec<StepMetric> {
    let mut cumulative_surprise = 0.0f64;
    steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let p = f64::from(step.chosen_prob);
            let perplexity = if p > 0.0 { 1.0 / p } else { f64::INFINITY };
            let top_k_entropy = shannon_entropy(&step.top_probs);
            let logit_gap = if step.top_probs.len() >= 2 {
                f64::from(step.top_probs[0] - step.top_probs[1])
            } else {
                0.0
            };
            if p < config.surprise_probability_threshold {
                // ln(0) is -inf, so a zero-probability token pushes the
                // running sum to +inf; the sum stays non-decreasing.
                cumulative_surprise += -p.ln();
            }
            #[allow(clippy::cast_possible_truncation)]
            let step_index = index as u32;
            StepMetric {
                step_index,
                token_text: step.token_text.clone(),
                perplexity,
                top_k_entropy,
                logit_gap,
                cumulative_surprise,
            }
        })
        .collect()
}

pub(crate) struct Aggregates {
    pub avg_perplexity: f64,
    pub max_perplexity: f64,
    pub avg_entropy: f64,
    pub max_entropy: f64,
    pub final_surprise: f64,
}

/// Aggregate step telemetry. Perplexity averages and maxima consider only
/// finite steps and collapse to `+inf` when no step is finite; entropy
/// spans all steps.
pub(crate) fn aggregate(metrics: &[StepMetric]) -> Aggregates {
    let finite: Vec<f64> =
        metrics.iter().map(|m| m.perplexity).filter(|p| p.is_finite()).collect();

    let (avg_perplexity, max_perplexity) = if finite.is_empty() {
        (f64::INFINITY, f64::INFINITY)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let avg = finite.iter().sum::<f64>() / finite.len() as f64;
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (avg, max)
    };

    let (avg_entropy, max_entropy) = if metrics.is_empty() {
        (0.0, 0.0)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let avg = metrics.iter().map(|m| m.top_k_entropy).sum::<f64>() / metrics.len() as f64;
        let max = metrics.iter().map(|m| m.top_k_entropy).fold(f64::NEG_INFINITY, f64::max);
        (avg, max)
    };

    let final_surprise = metrics.last().map_or(0.0, |m| m.cumulative_surprise);

    Aggregates { avg_perplexity, max_perplexity, avg_entropy, max_entropy, final_surprise }
}
