//! Service facade: construction, correlation, and sync/async entry points
//!
//! [`MonitoringService`] owns the engine and its resource, assigns every
//! request a correlation id, and exposes blocking, async, and batch entry
//! points plus an aggregated health report.

use crate::engine::{EngineOptions, MonitoringEngine};
use crate::metrics::MetricsCollector;
use candor_common::{
    AnalysisError, AnalysisOutcome, HealthReport, HealthStatus, ResourceError,
};
use candor_inference::{
    DevicePreference, DeviceSpec, GenerationParams, GenerationResource, ManagedResource,
    ModelLoader, Quantization,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn};
use uuid::Uuid;

/// Service construction options.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    pub model_id: String,
    pub device: DevicePreference,
    pub quantization: Option<Quantization>,
    pub engine: EngineOptions,
    pub enable_metrics: bool,
    /// Load the model during construction. When `false` the service starts
    /// unloaded and callers must [`MonitoringService::reload`] before use.
    pub preload: bool,
    /// Total timeout applied by [`MonitoringService::analyze`]; batch entry
    /// points divide it evenly across their prompts.
    pub default_timeout: Duration,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            model_id: "default".to_string(),
            device: DevicePreference::Auto,
            quantization: None,
            engine: EngineOptions::default(),
            enable_metrics: true,
            preload: true,
            default_timeout: Duration::from_secs(30),
        }
    }
}

/// Facade over one monitoring engine and its generation resource.
///
/// Cheap to clone via the inner `Arc`s; every entry point is safe to call
/// from multiple threads.
pub struct MonitoringService {
    engine: Arc<MonitoringEngine>,
    default_timeout: Duration,
}

impl MonitoringService {
    /// Build the service: resolve the device against the loader, load the
    /// model, and wire up the engine.
    pub fn new(loader: Arc<dyn ModelLoader>, options: ServiceOptions) -> Result<Self, AnalysisError> {
        let device = options.device.resolve(loader.accelerator_available());
        let spec = DeviceSpec::for_device(device, options.quantization);
        let resource =
            Arc::new(GenerationResource::new(options.model_id.clone(), spec, loader));

        if options.preload {
            resource.load().map_err(|err| match err {
                ResourceError::AcceleratorExhausted { detail } => {
                    AnalysisError::AcceleratorExhausted { detail }
                }
                other => AnalysisError::Unexpected {
                    message: format!("initial load of {} failed: {other}", options.model_id),
                },
            })?;
        }

        let metrics = Arc::new(MetricsCollector::new(options.enable_metrics));
        let engine = Arc::new(MonitoringEngine::new(resource, options.engine, metrics));

        info!(model_id = %options.model_id, device = %device, "monitoring service ready");
        Ok(Self { engine, default_timeout: options.default_timeout })
    }

    pub fn model_id(&self) -> &str {
        self.engine.resource().model_id()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Analyze one prompt with the service defaults.
    pub fn analyze(&self, prompt: &str) -> AnalysisOutcome {
        self.analyze_with(prompt, self.default_timeout, None, None)
    }

    /// Analyze one prompt with an explicit timeout and per-call overrides.
    pub fn analyze_with(
        &self,
        prompt: &str,
        timeout: Duration,
        max_new_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> AnalysisOutcome {
        let request_id = Uuid::new_v4();
        let span = info_span!(
            "analyze",
            request_id = %request_id,
            model_id = %self.model_id(),
        );
        let _enter = span.enter();

        let outcome = self.engine.analyze(prompt, timeout, max_new_tokens, temperature);
        if let Err(err) = &outcome {
            warn!(kind = err.kind(), recoverable = err.recoverable(), %err, "analysis failed");
        }
        outcome
    }

    /// Async wrapper: runs the blocking pipeline on the runtime's blocking
    /// pool so executor threads never stall on a long decode.
    pub async fn analyze_async(&self, prompt: impl Into<String>) -> AnalysisOutcome {
        self.analyze_async_with(prompt, self.default_timeout, None, None).await
    }

    /// Async counterpart of [`MonitoringService::analyze_with`]: explicit
    /// timeout and per-call overrides, identical semantics.
    pub async fn analyze_async_with(
        &self,
        prompt: impl Into<String>,
        timeout: Duration,
        max_new_tokens: Option<u32>,
        temperature: Option<f64>,
    ) -> AnalysisOutcome {
        let engine = self.engine.clone();
        let prompt = prompt.into();
        let request_id = Uuid::new_v4();
        let model_id = self.model_id().to_string();

        tokio::task::spawn_blocking(move || {
            let span = info_span!("analyze", request_id = %request_id, model_id = %model_id);
            let _enter = span.enter();
            engine.analyze(&prompt, timeout, max_new_tokens, temperature)
        })
        .await
        .unwrap_or_else(|err| {
            Err(AnalysisError::Unexpected { message: format!("analysis task panicked: {err}") })
        })
    }

    /// Analyze each prompt independently with the default total timeout.
    pub fn analyze_batch<S: AsRef<str>>(&self, prompts: &[S]) -> Vec<AnalysisOutcome> {
        self.analyze_batch_within(prompts, self.default_timeout)
    }

    /// Analyze each prompt independently; one failing prompt never aborts
    /// the rest. Outcomes are returned in input order. The total timeout is
    /// divided evenly across the batch.
    pub fn analyze_batch_within<S: AsRef<str>>(
        &self,
        prompts: &[S],
        total_timeout: Duration,
    ) -> Vec<AnalysisOutcome> {
        let per_prompt = per_prompt_timeout(total_timeout, prompts.len());
        prompts
            .iter()
            .map(|prompt| self.analyze_with(prompt.as_ref(), per_prompt, None, None))
            .collect()
    }

    /// Concurrent batch with the default total timeout.
    pub async fn analyze_batch_async(&self, prompts: Vec<String>) -> Vec<AnalysisOutcome> {
        self.analyze_batch_async_within(prompts, self.default_timeout).await
    }

    /// Concurrent batch: one blocking task per prompt, joined in input
    /// order. Each prompt gets an even slice of the total timeout; a failed
    /// prompt never cancels its siblings.
    pub async fn analyze_batch_async_within(
        &self,
        prompts: Vec<String>,
        total_timeout: Duration,
    ) -> Vec<AnalysisOutcome> {
        let per_prompt = per_prompt_timeout(total_timeout, prompts.len());

        let handles: Vec<_> = prompts
            .into_iter()
            .map(|prompt| {
                let engine = self.engine.clone();
                let model_id = self.model_id().to_string();
                tokio::task::spawn_blocking(move || {
                    let request_id = Uuid::new_v4();
                    let span =
                        info_span!("analyze", request_id = %request_id, model_id = %model_id);
                    let _enter = span.enter();
                    engine.analyze(&prompt, per_prompt, None, None)
                })
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            outcomes.push(handle.await.unwrap_or_else(|err| {
                Err(AnalysisError::Unexpected {
                    message: format!("analysis task panicked: {err}"),
                })
            }));
        }
        outcomes
    }

    /// Aggregate health: the resource's loaded state plus a one-token smoke
    /// generation. Unloaded is `Unhealthy`; loaded with a failing smoke
    /// test is `Degraded`.
    pub fn health_check(&self) -> HealthReport {
        let resource = self.engine.resource();
        let loaded = resource.health_check();

        let mut checks = BTreeMap::new();
        checks.insert("resource_loaded".to_string(), loaded);

        let smoke = if loaded {
            let params = GenerationParams {
                max_new_tokens: 1,
                deadline: Some(Instant::now() + Duration::from_secs(1)),
                ..GenerationParams::default()
            };
            resource.generate("ping", &params).is_ok()
        } else {
            false
        };
        checks.insert("generation".to_string(), smoke);

        let status = if !loaded {
            HealthStatus::Unhealthy
        } else if !smoke {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, checks }
    }

    pub fn clear_cache(&self) {
        self.engine.clear_cache();
    }

    /// Release the underlying model. Subsequent analyses fail with
    /// [`AnalysisError::ResourceNotLoaded`] until the resource is reloaded.
    pub fn unload(&self) {
        self.engine.resource().unload();
    }

    /// Reload the underlying model after an [`MonitoringService::unload`].
    pub fn reload(&self) -> Result<(), AnalysisError> {
        self.engine.resource().load().map_err(|err| AnalysisError::Unexpected {
            message: format!("reload failed: {err}"),
        })
    }

    pub fn engine(&self) -> &Arc<MonitoringEngine> {
        &self.engine
    }
}

fn per_prompt_timeout(total: Duration, batch_len: usize) -> Duration {
    match u32::try_from(batch_len.max(1)) {
        Ok(n) => total / n,
        Err(_) => Duration::ZERO,
    }
}
