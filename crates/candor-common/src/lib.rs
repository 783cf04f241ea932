//! Common types, traits, and utilities for the candor monitoring toolkit
//!
//! This crate provides the foundational types used across the candor
//! ecosystem: the monitoring configuration, the error taxonomy, and the
//! plain-data analysis results consumed by downstream reporting tooling.

pub mod config;
pub mod error;
pub mod types;

pub use config::MonitoringConfig;
pub use error::{AnalysisError, ResourceError, RuntimeError};
pub use types::{AnalysisResult, HealthReport, HealthStatus, StepMetric};

/// Result type for analysis operations.
pub type AnalysisOutcome = std::result::Result<AnalysisResult, AnalysisError>;
