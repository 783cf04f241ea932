//! Managed lifecycle around a loaded model/tokenizer pair

use crate::device::{release_cached_memory, DeviceSpec};
use crate::runtime::{
    GenerationParams, GenerationTrace, LoadedRuntime, ModelLoader, StepDistribution,
};
use candor_common::ResourceError;
use candor_logits::{apply_temperature, argmax, sample_index, softmax_in_place, top_k_probs};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Lifecycle contract for anything that owns an expensive sub-resource.
///
/// `load` is idempotent: calling it on an already-loaded resource is a
/// no-op, not an error. `health_check` returns `true` only when every
/// sub-resource required for normal operation is present and usable.
pub trait ManagedResource: Send + Sync {
    fn load(&self) -> Result<(), ResourceError>;
    fn unload(&self);
    fn health_check(&self) -> bool;
    fn is_loaded(&self) -> bool;
}

#[derive(Default)]
struct ResourceState {
    runtime: Option<LoadedRuntime>,
    pad_token: Option<u32>,
    load_ms: u64,
    memory_bytes: u64,
}

/// A generation-capable model and its tokenizer, bound to one device.
///
/// Constructed unloaded. All state transitions happen under a single
/// mutex; generation itself runs on cloned `Arc` handles so a long decode
/// never blocks health checks or unload requests.
pub struct GenerationResource {
    model_id: String,
    spec: DeviceSpec,
    loader: Arc<dyn ModelLoader>,
    state: Mutex<ResourceState>,
}

impl GenerationResource {
    pub fn new(model_id: impl Into<String>, spec: DeviceSpec, loader: Arc<dyn ModelLoader>) -> Self {
        Self { model_id: model_id.into(), spec, loader, state: Mutex::new(ResourceState::default()) }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn loader(&self) -> &Arc<dyn ModelLoader> {
        &self.loader
    }

    /// Approximate resident size of the loaded weights, 0 when unloaded.
    pub fn memory_bytes(&self) -> u64 {
        self.lock_state().memory_bytes
    }

    /// Wall-clock duration of the last successful load, 0 when never loaded.
    pub fn load_ms(&self) -> u64 {
        self.lock_state().load_ms
    }

    // A poisoned lock means a panic mid-transition elsewhere; the state
    // itself is either fully loaded or fully unloaded, so recover the guard.
    fn lock_state(&self) -> MutexGuard<'_, ResourceState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn snapshot_runtime(&self) -> Result<LoadedRuntime, ResourceError> {
        self.lock_state().runtime.clone().ok_or(ResourceError::NotLoaded)
    }

    /// Run one autoregressive generation, capturing per-step top-k
    /// probability mass.
    ///
    /// Greedy decoding at `temperature == 0.0`; seeded weighted sampling
    /// otherwise. Stops on EOS, `max_new_tokens`, or a cooperative deadline
    /// ([`ResourceError::DeadlineExceeded`]). An accelerator out-of-memory
    /// report from the model surfaces as
    /// [`ResourceError::AcceleratorExhausted`].
    pub fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerationTrace, ResourceError> {
        let runtime = self.snapshot_runtime()?;
        let start = Instant::now();

        let mut context = runtime.tokenizer.encode(prompt).map_err(ResourceError::from)?;
        let eos = runtime.tokenizer.eos_token_id();

        let seed = params.seed.unwrap_or_else(entropy_seed);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut generated: Vec<u32> = Vec::new();
        let mut steps: Vec<StepDistribution> = Vec::new();

        for _ in 0..params.max_new_tokens {
            if let Some(deadline) = params.deadline {
                if Instant::now() >= deadline {
                    return Err(ResourceError::DeadlineExceeded {
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
            }

            let mut logits = runtime.model.forward(&context).map_err(ResourceError::from)?;

            #[allow(clippy::cast_possible_truncation)]
            apply_temperature(&mut logits, params.temperature as f32);
            softmax_in_place(&mut logits);

            let top = top_k_probs(&logits, params.top_k as usize);

            #[allow(clippy::float_cmp)]
            let chosen = if params.temperature == 0.0 {
                argmax(&logits)
            } else {
                sample_index(&logits, &mut rng)
            };
            let chosen_prob = logits.get(chosen).copied().unwrap_or(0.0);
            let chosen = chosen as u32;

            if Some(chosen) == eos {
                debug!(steps = steps.len(), "generation reached EOS");
                break;
            }

            let token_text =
                runtime.tokenizer.decode_token(chosen).map_err(ResourceError::from)?;

            steps.push(StepDistribution {
                token_id: chosen,
                token_text,
                chosen_prob,
                top_probs: top.iter().map(|&(_, p)| p).collect(),
            });
            generated.push(chosen);
            context.push(chosen);
        }

        let text = runtime.tokenizer.decode(&generated).map_err(ResourceError::from)?;

        debug!(
            model_id = %self.model_id,
            device = %self.spec.device,
            tokens = generated.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation complete"
        );

        Ok(GenerationTrace { token_ids: generated, text, steps })
    }
}

impl ManagedResource for GenerationResource {
    fn load(&self) -> Result<(), ResourceError> {
        let mut state = self.lock_state();
        if state.runtime.is_some() {
            debug!(model_id = %self.model_id, "resource already loaded");
            return Ok(());
        }

        let start = Instant::now();
        let runtime = self.loader.load(&self.model_id, &self.spec).map_err(|err| match err {
            candor_common::RuntimeError::OutOfMemory { device, detail } => {
                ResourceError::AcceleratorExhausted { detail: format!("{device}: {detail}") }
            }
            other => ResourceError::Load { reason: other.to_string() },
        })?;

        let pad_token = match runtime.tokenizer.pad_token_id() {
            Some(pad) => Some(pad),
            None => {
                let eos = runtime.tokenizer.eos_token_id();
                if eos.is_some() {
                    warn!(
                        model_id = %self.model_id,
                        "tokenizer has no pad token, substituting EOS"
                    );
                }
                eos
            }
        };

        state.memory_bytes = runtime.model.memory_bytes();
        state.load_ms = start.elapsed().as_millis() as u64;
        state.pad_token = pad_token;
        state.runtime = Some(runtime);

        info!(
            model_id = %self.model_id,
            device = %self.spec.device,
            load_ms = state.load_ms,
            memory_bytes = state.memory_bytes,
            "resource loaded"
        );
        Ok(())
    }

    fn unload(&self) {
        let mut state = self.lock_state();
        if state.runtime.take().is_none() {
            return;
        }
        state.memory_bytes = 0;
        state.pad_token = None;
        release_cached_memory(&self.spec.device);
        info!(model_id = %self.model_id, device = %self.spec.device, "resource unloaded");
    }

    fn health_check(&self) -> bool {
        self.lock_state().runtime.is_some()
    }

    fn is_loaded(&self) -> bool {
        self.lock_state().runtime.is_some()
    }
}

/// Scoped ownership of a resource: dropping the guard unloads it.
///
/// Guarantees release on every exit path, including early returns and
/// error propagation.
pub struct ResourceGuard {
    resource: Arc<GenerationResource>,
}

impl ResourceGuard {
    pub fn new(resource: Arc<GenerationResource>) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &Arc<GenerationResource> {
        &self.resource
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        self.resource.unload();
    }
}

fn entropy_seed() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}
