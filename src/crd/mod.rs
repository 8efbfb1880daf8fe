//! # Custom Resource Definitions
//!
//! CRD types for the Sync Policy Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `SyncPolicy` specification, namespace selector and delete references
//! - `manifest.rs` - Opaque resource manifests carried in `syncItems`
//! - `status.rs` - Status, conditions and item counters

mod manifest;
mod spec;
mod status;

pub use manifest::{Manifest, ManifestIdentity};
pub use spec::{default_false, DeleteRef, NamespaceSelector, SyncPolicy, SyncPolicySpec};
pub use status::{Condition, ConditionStatus, ConditionType, SyncPolicyStatus};
