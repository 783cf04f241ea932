//! Runtime abstraction: model, tokenizer, and loader traits
//!
//! The monitoring engine never touches a concrete inference library. It
//! sees a [`LanguageModel`] that maps a token context to next-token logits,
//! a [`Tokenizer`], and a [`ModelLoader`] that constructs both for a given
//! device placement. Accelerator out-of-memory conditions are reported as a
//! typed [`RuntimeError::OutOfMemory`] value, never as a panic.

use candor_common::RuntimeError;
use std::sync::Arc;
use std::time::Instant;

/// A loaded generation model: token context in, next-token logits out.
pub trait LanguageModel: Send + Sync {
    /// Compute logits over the vocabulary for the next token.
    fn forward(&self, tokens: &[u32]) -> Result<Vec<f32>, RuntimeError>;

    fn vocab_size(&self) -> usize;

    /// Approximate resident size of the loaded weights.
    fn memory_bytes(&self) -> u64 {
        0
    }
}

/// Text/token conversion for one model family.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Result<Vec<u32>, RuntimeError>;

    fn decode(&self, tokens: &[u32]) -> Result<String, RuntimeError>;

    /// Decode a single token id; the default routes through [`Tokenizer::decode`].
    fn decode_token(&self, token: u32) -> Result<String, RuntimeError> {
        self.decode(&[token])
    }

    fn vocab_size(&self) -> usize;

    fn eos_token_id(&self) -> Option<u32>;

    fn pad_token_id(&self) -> Option<u32>;
}

/// A model/tokenizer pair produced by one [`ModelLoader::load`] call.
#[derive(Clone)]
pub struct LoadedRuntime {
    pub model: Arc<dyn LanguageModel>,
    pub tokenizer: Arc<dyn Tokenizer>,
}

/// Constructs runtimes for a model id on a given device placement.
///
/// The loader is the single owner of model-construction knowledge. It is
/// passed explicitly into every component that needs one — the primary
/// resource and the CPU-fallback resource share the same loader instance —
/// so there is no process-wide model registry.
pub trait ModelLoader: Send + Sync {
    fn load(
        &self,
        model_id: &str,
        spec: &crate::device::DeviceSpec,
    ) -> Result<LoadedRuntime, RuntimeError>;

    /// Whether this loader can place models on an accelerator at all.
    fn accelerator_available(&self) -> bool {
        false
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    /// `0.0` selects greedy decoding; anything above samples.
    pub temperature: f64,
    /// How many top candidates to record per step.
    pub top_k: u32,
    /// RNG seed for reproducible sampling runs.
    pub seed: Option<u64>,
    /// Cooperative deadline: generation stops with an error before starting
    /// a step past this instant. An in-flight forward pass is not interrupted.
    pub deadline: Option<Instant>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self { max_new_tokens: 64, temperature: 0.0, top_k: 10, seed: None, deadline: None }
    }
}

/// Per-step probability snapshot captured during generation.
#[derive(Debug, Clone)]
pub struct StepDistribution {
    pub token_id: u32,
    pub token_text: String,
    /// Probability the model assigned to the chosen token.
    pub chosen_prob: f32,
    /// Top-k probability mass, sorted descending; length ≤ the requested k.
    pub top_probs: Vec<f32>,
}

/// Full output of one generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerationTrace {
    pub token_ids: Vec<u32>,
    pub text: String,
    pub steps: Vec<StepDistribution>,
}
