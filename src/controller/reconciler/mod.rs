//! # Reconciler
//!
//! Core reconciliation logic for SyncPolicy resources.
//!
//! A run validates the policy, resolves its target namespaces and then, per
//! namespace, deletes the `deleteItems` and converges the `syncItems`.
//!
//! ## Module Structure
//!
//! - `types.rs` - Reconciler context, errors and backoff state
//! - `validation.rs` - Spec validation and selector compilation
//! - `patterns.rs` - Anchored namespace name patterns
//! - `selector.rs` - Label selector evaluation
//! - `namespaces.rs` - Namespace resolution
//! - `substitution.rs` - `${PROJECT_NAME}` substitution
//! - `sync_items.rs` - Create-or-update with force-recreate
//! - `delete_items.rs` - Deletion tolerant of absence
//! - `run.rs` - One reconciliation run and its counters
//! - `status.rs` - Conditions and status persistence
//! - `reconcile.rs` - Controller entry point
//! - `namespace_events.rs` - Namespace-triggered runs

pub mod delete_items;
pub mod namespace_events;
pub mod namespaces;
pub mod patterns;
pub mod reconcile;
pub mod run;
pub mod selector;
pub mod status;
pub mod substitution;
pub mod sync_items;
pub mod types;
pub mod validation;

pub use namespace_events::reconcile_namespace;
pub use reconcile::{reconcile, reconcile_policy, PolicyReconciliation};
pub use run::{ReconciliationRun, RunCounters, RunOutcome};
pub use types::{
    policy_key, BackoffState, CompletedRun, PolicyStates, Reconciler, ReconcilerError,
    TriggerSource, NAMESPACE_KEY_PREFIX,
};
