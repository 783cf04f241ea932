//! Managed generation resources for the candor toolkit
//!
//! This crate defines the seam between the monitoring engine and whatever
//! concrete inference library backs the system: dyn traits for the model,
//! tokenizer, and loader ([`runtime`]), the device/precision policy
//! ([`device`]), and the mutex-guarded resource lifecycle around a loaded
//! model/tokenizer pair ([`resource`]).
//!
//! The [`testing`] module ships scripted runtimes used by downstream test
//! suites.

pub mod device;
pub mod resource;
pub mod runtime;
pub mod testing;

pub use device::{release_cached_memory, Device, DevicePreference, DeviceSpec, Precision, Quantization};
pub use resource::{GenerationResource, ManagedResource, ResourceGuard};
pub use runtime::{
    GenerationParams, GenerationTrace, LanguageModel, LoadedRuntime, ModelLoader,
    StepDistribution, Tokenizer,
};
