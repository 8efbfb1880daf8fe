//! # In-Memory Object Store
//!
//! A complete [`ObjectStore`] kept in process memory.
//!
//! Behaves like the API server where the reconciler can observe it:
//! resourceVersion compare-and-swap on replace, uid/generation/creation
//! timestamp stamping on create, `AlreadyExists` and `NotFound` errors.
//! Faults can be injected per kind and name to exercise failure paths.

use super::{NamespaceInfo, ObjectStore, Propagation, ResourceKey, StoreError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A mutating call received by the store, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Create(ResourceKey),
    Replace(ResourceKey),
    Delete(ResourceKey, Propagation),
}

#[derive(Debug, Default)]
struct Faults {
    namespace_list: Option<String>,
    create: HashSet<(String, String)>,
    replace_invalid: HashSet<(String, String)>,
    replace: HashSet<(String, String)>,
    delete: HashSet<(String, String)>,
}

#[derive(Debug, Default)]
struct MemoryState {
    namespaces: BTreeMap<String, NamespaceInfo>,
    objects: BTreeMap<ResourceKey, Value>,
    next_version: u64,
    faults: Faults,
    calls: Vec<StoreCall>,
}

impl MemoryState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// Object store backed by a `BTreeMap`
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    state: Mutex<MemoryState>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a namespace
    pub fn insert_namespace(&self, namespace: NamespaceInfo) {
        self.state()
            .namespaces
            .insert(namespace.name.clone(), namespace);
    }

    /// Seed an object directly, bypassing faults and the call log
    ///
    /// The object must carry apiVersion, kind, metadata.namespace and metadata.name.
    pub fn insert_object(&self, object: Value) -> Result<ResourceKey, StoreError> {
        let key = ResourceKey::from_object(&object)
            .ok_or_else(|| StoreError::Invalid("object without full coordinates".to_string()))?;
        let mut state = self.state();
        let version = state.bump_version();
        let stamped = stamp_new(object, &version);
        state.objects.insert(key.clone(), stamped);
        Ok(key)
    }

    /// Current content of an object
    pub fn object(&self, key: &ResourceKey) -> Option<Value> {
        self.state().objects.get(key).cloned()
    }

    /// Every mutating call received so far
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Make `list_namespaces` fail until cleared with `None`
    pub fn fail_namespace_list(&self, message: Option<&str>) {
        self.state().faults.namespace_list = message.map(str::to_string);
    }

    /// Make every create of `kind`/`name` fail with an API error
    pub fn fail_create(&self, kind: &str, name: &str) {
        self.state()
            .faults
            .create
            .insert((kind.to_string(), name.to_string()));
    }

    /// Reject every replace of `kind`/`name` as invalid, like an immutable field change
    pub fn reject_replace_as_invalid(&self, kind: &str, name: &str) {
        self.state()
            .faults
            .replace_invalid
            .insert((kind.to_string(), name.to_string()));
    }

    /// Make every replace of `kind`/`name` fail with an API error
    pub fn fail_replace(&self, kind: &str, name: &str) {
        self.state()
            .faults
            .replace
            .insert((kind.to_string(), name.to_string()));
    }

    /// Make every delete of `kind`/`name` fail with an API error
    pub fn fail_delete(&self, kind: &str, name: &str) {
        self.state()
            .faults
            .delete
            .insert((kind.to_string(), name.to_string()));
    }
}

fn fault_key(key: &ResourceKey) -> (String, String) {
    (key.kind.clone(), key.name.clone())
}

fn metadata_str<'a>(object: &'a Value, field: &str) -> Option<&'a str> {
    object
        .get("metadata")
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
}

fn set_metadata(object: &mut Value, field: &str, value: Value) {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.insert(field.to_string(), value);
    }
}

/// Stamp the fields the API server sets on creation
fn stamp_new(mut object: Value, version: &str) -> Value {
    set_metadata(&mut object, "uid", json!(uuid::Uuid::new_v4().to_string()));
    set_metadata(&mut object, "resourceVersion", json!(version));
    set_metadata(&mut object, "generation", json!(1));
    set_metadata(
        &mut object,
        "creationTimestamp",
        json!(chrono::Utc::now().to_rfc3339()),
    );
    object
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, StoreError> {
        let state = self.state();
        if let Some(message) = &state.faults.namespace_list {
            return Err(StoreError::Api(message.clone()));
        }
        Ok(state.namespaces.values().cloned().collect())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>, StoreError> {
        let state = self.state();
        if let Some(message) = &state.faults.namespace_list {
            return Err(StoreError::Api(message.clone()));
        }
        Ok(state.namespaces.get(name).cloned())
    }

    async fn get(&self, key: &ResourceKey) -> Result<Value, StoreError> {
        self.state()
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn create(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.push(StoreCall::Create(key.clone()));

        if state.faults.create.contains(&fault_key(key)) {
            return Err(StoreError::Api(format!("{key}: create rejected")));
        }
        if !state.namespaces.contains_key(&key.namespace) {
            return Err(StoreError::NotFound(format!("namespace {}", key.namespace)));
        }
        if state.objects.contains_key(key) {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        let version = state.bump_version();
        let stamped = stamp_new(object.clone(), &version);
        state.objects.insert(key.clone(), stamped.clone());
        Ok(stamped)
    }

    async fn replace(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError> {
        let mut state = self.state();
        state.calls.push(StoreCall::Replace(key.clone()));

        if state.faults.replace_invalid.contains(&fault_key(key)) {
            return Err(StoreError::Invalid(format!("{key}: field is immutable")));
        }
        if state.faults.replace.contains(&fault_key(key)) {
            return Err(StoreError::Api(format!("{key}: replace rejected")));
        }

        let existing = state
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let stored_version = metadata_str(existing, "resourceVersion").unwrap_or_default();
        if let Some(version) = metadata_str(object, "resourceVersion") {
            if version != stored_version {
                return Err(StoreError::Conflict(format!(
                    "{key}: resourceVersion {version} is stale, current is {stored_version}"
                )));
            }
        }
        let stored_uid = metadata_str(existing, "uid").map(str::to_string);
        if let Some(uid) = metadata_str(object, "uid") {
            if Some(uid) != stored_uid.as_deref() {
                return Err(StoreError::Conflict(format!("{key}: uid mismatch")));
            }
        }
        let generation = existing
            .pointer("/metadata/generation")
            .and_then(Value::as_i64)
            .unwrap_or(1);
        let created_at = existing.pointer("/metadata/creationTimestamp").cloned();

        let version = state.bump_version();
        let mut updated = object.clone();
        set_metadata(&mut updated, "resourceVersion", json!(version));
        set_metadata(&mut updated, "generation", json!(generation + 1));
        if let Some(uid) = stored_uid {
            set_metadata(&mut updated, "uid", json!(uid));
        }
        if let Some(created_at) = created_at {
            set_metadata(&mut updated, "creationTimestamp", created_at);
        }
        state.objects.insert(key.clone(), updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ResourceKey, propagation: Propagation) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(StoreCall::Delete(key.clone(), propagation));

        if state.faults.delete.contains(&fault_key(key)) {
            return Err(StoreError::Api(format!("{key}: delete rejected")));
        }
        // No dependents are tracked, so both propagation modes remove the object immediately
        state
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_map(namespace: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cm", "namespace": namespace},
            "data": {"k": "v"}
        })
    }

    fn store() -> InMemoryObjectStore {
        let store = InMemoryObjectStore::new();
        store.insert_namespace(NamespaceInfo::active("ns-a"));
        store
    }

    #[tokio::test]
    async fn test_create_stamps_server_fields() {
        let store = store();
        let key = ResourceKey::new("v1", "ConfigMap", "ns-a", "cm");
        let created = store.create(&key, &config_map("ns-a")).await.unwrap();
        assert!(created.pointer("/metadata/uid").is_some());
        assert_eq!(created["metadata"]["generation"], 1);

        let again = store.create(&key, &config_map("ns-a")).await;
        assert!(again.unwrap_err().is_already_exists());
    }

    #[tokio::test]
    async fn test_create_in_missing_namespace_fails() {
        let store = store();
        let key = ResourceKey::new("v1", "ConfigMap", "ns-missing", "cm");
        let result = store.create(&key, &config_map("ns-missing")).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_replace_rejects_stale_version() {
        let store = store();
        let key = store.insert_object(config_map("ns-a")).unwrap();
        let current = store.get(&key).await.unwrap();

        let mut stale = current.clone();
        set_metadata(&mut stale, "resourceVersion", json!("0"));
        let result = store.replace(&key, &stale).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));

        let updated = store.replace(&key, &current).await.unwrap();
        assert_ne!(
            updated["metadata"]["resourceVersion"],
            current["metadata"]["resourceVersion"]
        );
        assert_eq!(updated["metadata"]["uid"], current["metadata"]["uid"]);
        assert_eq!(updated["metadata"]["generation"], 2);
    }

    #[tokio::test]
    async fn test_delete_missing_object_is_not_found() {
        let store = store();
        let key = ResourceKey::new("v1", "ConfigMap", "ns-a", "absent");
        let result = store.delete(&key, Propagation::Background).await;
        assert!(result.unwrap_err().is_not_found());
        assert_eq!(
            store.calls(),
            vec![StoreCall::Delete(key, Propagation::Background)]
        );
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let store = store();
        let key = store.insert_object(config_map("ns-a")).unwrap();
        store.reject_replace_as_invalid("ConfigMap", "cm");
        store.fail_delete("ConfigMap", "cm");
        store.fail_namespace_list(Some("connection refused"));

        let current = store.get(&key).await.unwrap();
        assert!(store.replace(&key, &current).await.unwrap_err().is_invalid());
        assert!(matches!(
            store.delete(&key, Propagation::Background).await,
            Err(StoreError::Api(_))
        ));
        assert!(store.list_namespaces().await.is_err());

        store.fail_namespace_list(None);
        assert_eq!(store.list_namespaces().await.unwrap().len(), 1);
    }
}
