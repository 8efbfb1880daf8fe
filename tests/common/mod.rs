//! Shared fixtures for the integration tests
//!
//! Builds policies and seeds an `InMemoryObjectStore` so the reconciler can
//! be exercised without a cluster.

#![allow(dead_code, reason = "Each test binary uses a different subset of the fixtures")]

use serde_json::{json, Value};
use sync_policy_controller::controller::store::{InMemoryObjectStore, NamespaceInfo};
use sync_policy_controller::crd::{
    DeleteRef, Manifest, NamespaceSelector, SyncPolicy, SyncPolicySpec,
};

pub const POLICY_NAMESPACE: &str = "platform";

/// A store holding the given Active namespaces
pub fn store_with_namespaces(names: &[&str]) -> InMemoryObjectStore {
    let store = InMemoryObjectStore::new();
    for name in names {
        store.insert_namespace(NamespaceInfo::active(*name));
    }
    store
}

pub fn match_names(patterns: &[&str]) -> Option<NamespaceSelector> {
    Some(NamespaceSelector {
        match_names: patterns.iter().map(ToString::to_string).collect(),
        ..Default::default()
    })
}

pub fn config_map(name: &str, data: Value) -> Manifest {
    Manifest::from(json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {"name": name},
        "data": data,
    }))
}

pub fn delete_ref(kind: &str, name: &str) -> DeleteRef {
    DeleteRef {
        name: name.to_string(),
        kind: kind.to_string(),
        api_version: "v1".to_string(),
    }
}

/// A stored policy at generation 1
pub fn policy(spec: SyncPolicySpec) -> SyncPolicy {
    let mut policy = SyncPolicy::new("project-defaults", spec);
    policy.metadata.namespace = Some(POLICY_NAMESPACE.to_string());
    policy.metadata.generation = Some(1);
    policy
}
