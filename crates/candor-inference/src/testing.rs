//! Scripted runtimes for tests
//!
//! Deterministic [`LanguageModel`] / [`Tokenizer`] / [`ModelLoader`]
//! implementations with programmable failure modes, shared by this crate's
//! tests and by downstream test suites.

use crate::device::DeviceSpec;
use crate::runtime::{LanguageModel, LoadedRuntime, ModelLoader, Tokenizer};
use candor_common::RuntimeError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Model that replays a fixed sequence of logits rows.
///
/// Row selection cycles over the script, so a one-row script yields the
/// same distribution forever. Failure modes: out-of-memory at a given call
/// index, and an optional per-call delay for deadline tests.
pub struct ScriptedModel {
    vocab_size: usize,
    rows: Vec<Vec<f32>>,
    oom_at_call: Option<usize>,
    step_delay: Option<Duration>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(vocab_size: usize, rows: Vec<Vec<f32>>) -> Self {
        Self { vocab_size, rows, oom_at_call: None, step_delay: None, calls: AtomicUsize::new(0) }
    }

    /// Report accelerator OOM on the `call`-th forward pass (zero-based).
    #[must_use]
    pub fn with_oom_at_call(mut self, call: usize) -> Self {
        self.oom_at_call = Some(call);
        self
    }

    /// Sleep before answering each forward pass.
    #[must_use]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Number of forward passes served so far.
    pub fn forward_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LanguageModel for ScriptedModel {
    fn forward(&self, _tokens: &[u32]) -> Result<Vec<f32>, RuntimeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }
        if self.oom_at_call == Some(call) {
            return Err(RuntimeError::OutOfMemory {
                device: "accelerator:0".to_string(),
                detail: "scripted allocation failure".to_string(),
            });
        }
        if self.rows.is_empty() {
            return Err(RuntimeError::Runtime { reason: "empty logits script".to_string() });
        }
        Ok(self.rows[call % self.rows.len()].clone())
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn memory_bytes(&self) -> u64 {
        (self.vocab_size * std::mem::size_of::<f32>()) as u64
    }
}

/// Byte-level tokenizer with a fixed vocabulary size.
///
/// Encoding maps each input byte into the vocabulary by modulo; decoding
/// renders token `n` as `t{n}`, space-joined. Deterministic and lossless
/// enough for telemetry assertions.
pub struct StaticTokenizer {
    vocab_size: usize,
    eos: Option<u32>,
    pad: Option<u32>,
}

impl StaticTokenizer {
    pub fn new(vocab_size: usize, eos: Option<u32>, pad: Option<u32>) -> Self {
        Self { vocab_size, eos, pad }
    }
}

impl Tokenizer for StaticTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, RuntimeError> {
        if self.vocab_size == 0 {
            return Err(RuntimeError::Tokenizer { reason: "empty vocabulary".to_string() });
        }
        #[allow(clippy::cast_possible_truncation)]
        let modulus = self.vocab_size as u32;
        Ok(text.bytes().map(|b| u32::from(b) % modulus).collect())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String, RuntimeError> {
        Ok(tokens.iter().map(|t| format!("t{t}")).collect::<Vec<_>>().join(" "))
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos
    }

    fn pad_token_id(&self) -> Option<u32> {
        self.pad
    }
}

/// Loader with independently scripted CPU and accelerator behavior.
#[derive(Default)]
pub struct ScriptedLoader {
    cpu: Option<LoadedRuntime>,
    accelerator: Option<LoadedRuntime>,
    accelerator_load_oom: bool,
    load_calls: AtomicUsize,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cpu(
        mut self,
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        self.cpu = Some(LoadedRuntime { model, tokenizer });
        self
    }

    #[must_use]
    pub fn with_accelerator(
        mut self,
        model: Arc<dyn LanguageModel>,
        tokenizer: Arc<dyn Tokenizer>,
    ) -> Self {
        self.accelerator = Some(LoadedRuntime { model, tokenizer });
        self
    }

    /// Make every accelerator load report out-of-memory.
    #[must_use]
    pub fn with_accelerator_load_oom(mut self) -> Self {
        self.accelerator_load_oom = true;
        self
    }

    /// Number of load attempts across both devices.
    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self, model_id: &str, spec: &DeviceSpec) -> Result<LoadedRuntime, RuntimeError> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        if spec.device.is_accelerator() {
            if self.accelerator_load_oom {
                return Err(RuntimeError::OutOfMemory {
                    device: spec.device.to_string(),
                    detail: "scripted load failure".to_string(),
                });
            }
            self.accelerator.clone().ok_or_else(|| RuntimeError::Runtime {
                reason: format!("no accelerator runtime scripted for {model_id}"),
            })
        } else {
            self.cpu.clone().ok_or_else(|| RuntimeError::Runtime {
                reason: format!("no cpu runtime scripted for {model_id}"),
            })
        }
    }

    fn accelerator_available(&self) -> bool {
        self.accelerator.is_some() || self.accelerator_load_oom
    }
}
