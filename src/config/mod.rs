//! # Configuration
//!
//! Controller configuration loaded from environment variables and
//! overridden by command line flags.

mod controller;
mod duration;

pub use controller::{ConfigOverrides, ControllerConfig, LogFormat};
pub use duration::parse_kubernetes_duration;
