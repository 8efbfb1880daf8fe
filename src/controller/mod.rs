//! # Controller
//!
//! Core controller modules for the Sync Policy Controller.
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `reconciler`: Namespace resolution, item sync and status computation
//! - `server`: HTTP server for metrics and health checks
//! - `store`: Object store seam over the Kubernetes API

pub mod backoff;
pub mod reconciler;
pub mod server;
pub mod store;
