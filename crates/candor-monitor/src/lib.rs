//! Generation-quality monitoring for autoregressive text generation
//!
//! The monitoring engine wraps a managed generation resource, extracts
//! per-token confidence telemetry (perplexity, top-k entropy, logit gap,
//! cumulative surprise), applies three-threshold quality gates, and
//! survives slow generation, accelerator memory exhaustion, and repeated
//! identical requests without failing the caller.
//!
//! Entry point: [`MonitoringService`], the sync/async/batch facade over a
//! single [`MonitoringEngine`].

pub mod cache;
pub mod engine;
pub mod export;
pub mod metrics;
pub mod service;
pub mod telemetry;

pub use cache::ResultCache;
pub use engine::{EngineOptions, MonitoringEngine};
pub use export::{QualityReport, QualitySummary};
pub use metrics::MetricsCollector;
pub use service::{MonitoringService, ServiceOptions};
pub use telemetry::init_tracing;
