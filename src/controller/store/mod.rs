//! # Object Store
//!
//! The seam between the reconciler and the API server.
//!
//! The reconciler only needs a handful of verbs on untyped objects, so it
//! talks to an [`ObjectStore`] instead of a `kube::Client`. Production code
//! uses [`KubeObjectStore`]; tests use [`InMemoryObjectStore`].

mod cluster;
mod memory;

pub use cluster::KubeObjectStore;
pub use memory::{InMemoryObjectStore, StoreCall};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Coordinates of a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Read the key of a fully qualified object
    ///
    /// Returns `None` when any coordinate is missing.
    #[must_use]
    pub fn from_object(object: &Value) -> Option<Self> {
        let field = |pointer: &str| {
            object
                .pointer(pointer)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        };
        Some(Self::new(
            field("/apiVersion")?,
            field("/kind")?,
            field("/metadata/namespace")?,
            field("/metadata/name")?,
        ))
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}/{} ({})",
            self.kind, self.namespace, self.name, self.api_version
        )
    }
}

/// What the resolver needs to know about a namespace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Lifecycle phase as reported by the API server (`Active`, `Terminating`)
    pub phase: Option<String>,
}

impl NamespaceInfo {
    pub fn active(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
            phase: Some(crate::constants::NAMESPACE_PHASE_ACTIVE.to_string()),
        }
    }

    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Namespaces without a reported phase are treated as not ready
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase.as_deref() == Some(crate::constants::NAMESPACE_PHASE_ACTIVE)
    }
}

/// Delete propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Return as soon as the object is marked for deletion
    Background,
    /// Return only after the object and its dependents are gone
    Foreground,
}

/// Errors returned by an [`ObjectStore`]
///
/// The variants the reconciler branches on are kept distinct: `AlreadyExists`
/// switches a create to an update, `Invalid` triggers force-recreate and
/// `NotFound` makes a delete a no-op.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("timed out: {0}")]
    Timeout(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, StoreError::Invalid(_))
    }
}

/// Untyped object access used by the reconciler
///
/// Objects are plain JSON documents. Implementations must support optimistic
/// concurrency on `replace` through `metadata.resourceVersion`.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// List every namespace in the cluster
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, StoreError>;

    /// Fetch a single namespace, `None` when it does not exist
    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>, StoreError>;

    /// Fetch an object
    async fn get(&self, key: &ResourceKey) -> Result<Value, StoreError>;

    /// Create an object, failing with `AlreadyExists` when the key is taken
    async fn create(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError>;

    /// Overwrite an existing object
    async fn replace(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError>;

    /// Delete an object
    ///
    /// With [`Propagation::Foreground`] the call returns once the object is gone.
    async fn delete(&self, key: &ResourceKey, propagation: Propagation) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_key_from_object() {
        let object = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "ns-a"}
        });
        let key = ResourceKey::from_object(&object).unwrap();
        assert_eq!(key, ResourceKey::new("apps/v1", "Deployment", "ns-a", "web"));
        assert_eq!(key.to_string(), "Deployment ns-a/web (apps/v1)");
    }

    #[test]
    fn test_resource_key_requires_namespace() {
        let object = json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "x"}});
        assert!(ResourceKey::from_object(&object).is_none());
    }

    #[test]
    fn test_namespace_is_active() {
        assert!(NamespaceInfo::active("ns-a").is_active());
        assert!(!NamespaceInfo::active("ns-a").with_phase("Terminating").is_active());
        let unknown = NamespaceInfo {
            name: "ns-b".to_string(),
            ..Default::default()
        };
        assert!(!unknown.is_active());
    }
}
