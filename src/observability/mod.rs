//! # Observability
//!
//! Prometheus metrics for the controller. Tracing is set up in
//! [`crate::runtime::initialization`].

pub mod metrics;

pub use metrics::*;
