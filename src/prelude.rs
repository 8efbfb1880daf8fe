//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use sync_policy_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Object store seam and its implementations
pub use crate::controller::store::{
    InMemoryObjectStore, KubeObjectStore, NamespaceInfo, ObjectStore, Propagation, ResourceKey,
    StoreError,
};

// Reconciler types
pub use crate::controller::reconciler::{
    reconcile, reconcile_namespace, reconcile_policy, PolicyReconciliation, Reconciler,
    ReconcilerError, RunCounters, RunOutcome, TriggerSource,
};

// Config types
pub use crate::config::{ConfigOverrides, ControllerConfig, LogFormat};
