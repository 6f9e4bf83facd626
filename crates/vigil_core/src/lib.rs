//! # vigil_core
//!
//! Shared domain primitives for the Vigil security policy engine:
//! - **Metrics snapshot model**: typed metric values and the per-repository
//!   snapshot evaluated by policies
//! - **`MetricsProvider`**: the async seam to whatever system computes a
//!   repository's current security posture
//! - **Core error types** shared by the engine crates

pub mod error;
pub mod metrics;

pub use error::{CoreError, CoreResult};
pub use metrics::{MetricValue, MetricsProvider, MetricsSnapshot, StaticMetricsProvider};
