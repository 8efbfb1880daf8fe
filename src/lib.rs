//! Sync Policy Controller Library
//!
//! Keeps a set of Kubernetes resources present (or absent) in every namespace
//! selected by a `SyncPolicy`.
//!
//! ## Quick Start
//!
//! ```rust
//! use sync_policy_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
