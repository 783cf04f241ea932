//! Error taxonomy for the candor toolkit
//!
//! Three layers, matching the component boundaries:
//!
//! * [`RuntimeError`] — raised by the model/tokenizer abstraction.
//! * [`ResourceError`] — raised by resource lifecycle and generation.
//! * [`AnalysisError`] — the value returned to callers of the monitoring
//!   engine and service; carries recoverability hints.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by the underlying generation runtime (model or tokenizer).
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Accelerator out of memory on {device}: {detail}")]
    OutOfMemory { device: String, detail: String },

    #[error("Runtime failure: {reason}")]
    Runtime { reason: String },

    #[error("Tokenizer failure: {reason}")]
    Tokenizer { reason: String },
}

/// Errors raised by a managed generation resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Resource load failed: {reason}")]
    Load { reason: String },

    #[error("Accelerator exhausted: {detail}")]
    AcceleratorExhausted { detail: String },

    #[error("Resource is not loaded")]
    NotLoaded,

    #[error("Generation failed: {reason}")]
    Generation { reason: String },

    #[error("Generation deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u64 },
}

impl From<RuntimeError> for ResourceError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::OutOfMemory { device, detail } => ResourceError::AcceleratorExhausted {
                detail: format!("{device}: {detail}"),
            },
            RuntimeError::Runtime { reason } => ResourceError::Generation { reason },
            RuntimeError::Tokenizer { reason } => ResourceError::Generation { reason },
        }
    }
}

/// Suggested retry delay after a resource reload.
const RESOURCE_RETRY_AFTER: Duration = Duration::from_secs(5);

/// The error value returned by `analyze` and every public service entry point.
///
/// Every variant answers two questions for the caller: is a retry worth
/// attempting ([`AnalysisError::recoverable`]) and, if so, how long to wait
/// ([`AnalysisError::retry_after`]).
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Prompt too long: {length} characters exceeds limit of {limit}")]
    PromptTooLong { length: usize, limit: usize },

    #[error("Resource not loaded: {message}")]
    ResourceNotLoaded { message: String },

    #[error("Generation timed out after {elapsed:?} (limit {timeout:?})")]
    GenerationTimeout { elapsed: Duration, timeout: Duration },

    #[error("Accelerator exhausted: {detail}")]
    AcceleratorExhausted { detail: String },

    #[error("Fallback generation failed: {detail}")]
    FallbackFailed { detail: String },

    #[error("Unexpected failure: {message}")]
    Unexpected { message: String },
}

impl AnalysisError {
    /// Whether a retry without caller-side changes can succeed.
    pub fn recoverable(&self) -> bool {
        match self {
            AnalysisError::InvalidInput { .. } | AnalysisError::PromptTooLong { .. } => false,
            AnalysisError::ResourceNotLoaded { .. } => true,
            AnalysisError::GenerationTimeout { .. } => true,
            AnalysisError::AcceleratorExhausted { .. } => true,
            AnalysisError::FallbackFailed { .. } => false,
            AnalysisError::Unexpected { .. } => false,
        }
    }

    /// Suggested delay before retrying, when one applies.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AnalysisError::ResourceNotLoaded { .. } => Some(RESOURCE_RETRY_AFTER),
            _ => None,
        }
    }

    /// Stable short name used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::InvalidInput { .. } => "invalid_input",
            AnalysisError::PromptTooLong { .. } => "prompt_too_long",
            AnalysisError::ResourceNotLoaded { .. } => "resource_not_loaded",
            AnalysisError::GenerationTimeout { .. } => "generation_timeout",
            AnalysisError::AcceleratorExhausted { .. } => "accelerator_exhausted",
            AnalysisError::FallbackFailed { .. } => "fallback_failed",
            AnalysisError::Unexpected { .. } => "unexpected",
        }
    }
}

impl From<anyhow::Error> for AnalysisError {
    fn from(err: anyhow::Error) -> Self {
        AnalysisError::Unexpected { message: format!("{err:#}") }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_oom_maps_to_accelerator_exhausted() {
        let err = RuntimeError::OutOfMemory {
            device: "accelerator:0".to_string(),
            detail: "allocation of 512 MiB failed".to_string(),
        };
        let resource_err: ResourceError = err.into();
        assert!(matches!(resource_err, ResourceError::AcceleratorExhausted { .. }));
        assert!(format!("{resource_err}").contains("accelerator:0"));
    }

    #[test]
    fn runtime_failures_map_to_generation() {
        let err: ResourceError =
            RuntimeError::Runtime { reason: "forward pass failed".to_string() }.into();
        assert!(matches!(err, ResourceError::Generation { .. }));

        let err: ResourceError =
            RuntimeError::Tokenizer { reason: "invalid byte sequence".to_string() }.into();
        assert!(matches!(err, ResourceError::Generation { .. }));
    }

    #[test]
    fn recoverability_matches_taxonomy() {
        let cases: Vec<(AnalysisError, bool)> = vec![
            (AnalysisError::InvalidInput { message: "empty".into() }, false),
            (AnalysisError::PromptTooLong { length: 9000, limit: 8192 }, false),
            (AnalysisError::ResourceNotLoaded { message: "unloaded".into() }, true),
            (
                AnalysisError::GenerationTimeout {
                    elapsed: Duration::from_secs(31),
                    timeout: Duration::from_secs(30),
                },
                true,
            ),
            (AnalysisError::AcceleratorExhausted { detail: "oom".into() }, true),
            (AnalysisError::FallbackFailed { detail: "cpu also failed".into() }, false),
            (AnalysisError::Unexpected { message: "bug".into() }, false),
        ];
        for (err, expected) in cases {
            assert_eq!(err.recoverable(), expected, "variant: {}", err.kind());
        }
    }

    #[test]
    fn retry_after_only_for_resource_not_loaded() {
        let err = AnalysisError::ResourceNotLoaded { message: "reloading".into() };
        assert!(err.retry_after().is_some());

        let err = AnalysisError::GenerationTimeout {
            elapsed: Duration::from_secs(2),
            timeout: Duration::from_secs(1),
        };
        assert!(err.retry_after().is_none());
    }

    #[test]
    fn display_formats_carry_context() {
        let err = AnalysisError::PromptTooLong { length: 10_000, limit: 8192 };
        let msg = format!("{err}");
        assert!(msg.contains("10000"));
        assert!(msg.contains("8192"));
    }
}
