//! # Kubernetes Object Store
//!
//! [`ObjectStore`] backed by the API server through `DynamicObject`.
//!
//! API resources are resolved with discovery and cached per
//! `apiVersion`/`kind`, so every manifest kind costs one discovery call for
//! the lifetime of the process.

use super::{NamespaceInfo, ObjectStore, Propagation, ResourceKey, StoreError};
use crate::constants::{
    FIELD_MANAGER, FOREGROUND_DELETE_POLL_INTERVAL_MS, FOREGROUND_DELETE_TIMEOUT_SECS,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Scope};
use kube::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// Object store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    resources: Arc<RwLock<HashMap<String, ApiResource>>>,
}

impl fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the API resource for a key, using the discovery cache
    async fn api_resource(&self, key: &ResourceKey) -> Result<ApiResource, StoreError> {
        let cache_key = format!("{}/{}", key.api_version, key.kind);
        if let Some(resource) = self.resources.read().await.get(&cache_key) {
            return Ok(resource.clone());
        }

        let (group, version) = parse_api_version(&key.api_version);
        let gvk = GroupVersionKind::gvk(&group, &version, &key.kind);
        let (resource, capabilities) = kube::discovery::pinned_kind(&self.client, &gvk)
            .await
            .map_err(|e| StoreError::Discovery(format!("{} {}: {e}", key.api_version, key.kind)))?;

        if capabilities.scope == Scope::Cluster {
            return Err(StoreError::Discovery(format!(
                "{} {} is cluster scoped and cannot be synced into a namespace",
                key.api_version, key.kind
            )));
        }

        debug!(
            api_version = %key.api_version,
            kind = %key.kind,
            plural = %resource.plural,
            "Discovered API resource"
        );
        self.resources
            .write()
            .await
            .insert(cache_key, resource.clone());
        Ok(resource)
    }

    async fn api(&self, key: &ResourceKey) -> Result<Api<DynamicObject>, StoreError> {
        let resource = self.api_resource(key).await?;
        Ok(Api::namespaced_with(
            self.client.clone(),
            &key.namespace,
            &resource,
        ))
    }

    /// Poll until the object is gone
    async fn wait_until_deleted(
        &self,
        api: &Api<DynamicObject>,
        key: &ResourceKey,
    ) -> Result<(), StoreError> {
        let timeout = Duration::from_secs(FOREGROUND_DELETE_TIMEOUT_SECS);
        let poll_interval = Duration::from_millis(FOREGROUND_DELETE_POLL_INTERVAL_MS);
        let start = Instant::now();

        loop {
            match api.get_opt(&key.name).await {
                Ok(None) => return Ok(()),
                Ok(Some(_)) => trace!(object = %key, "Waiting for foreground deletion"),
                Err(e) => return Err(classify_error(e, key)),
            }
            if start.elapsed() > timeout {
                return Err(StoreError::Timeout(format!(
                    "{key} still present {}s after foreground deletion",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn list_namespaces(&self) -> Result<Vec<NamespaceInfo>, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|e| StoreError::Api(format!("listing namespaces: {e}")))?;
        Ok(list.items.into_iter().map(namespace_info).collect())
    }

    async fn get_namespace(&self, name: &str) -> Result<Option<NamespaceInfo>, StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = api
            .get_opt(name)
            .await
            .map_err(|e| StoreError::Api(format!("getting namespace {name}: {e}")))?;
        Ok(namespace.map(namespace_info))
    }

    async fn get(&self, key: &ResourceKey) -> Result<Value, StoreError> {
        let api = self.api(key).await?;
        let object = api
            .get(&key.name)
            .await
            .map_err(|e| classify_error(e, key))?;
        to_value(&object, key)
    }

    async fn create(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError> {
        let api = self.api(key).await?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let created = api
            .create(&params, &to_dynamic(object, key)?)
            .await
            .map_err(|e| classify_error(e, key))?;
        to_value(&created, key)
    }

    async fn replace(&self, key: &ResourceKey, object: &Value) -> Result<Value, StoreError> {
        let api = self.api(key).await?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        let replaced = api
            .replace(&key.name, &params, &to_dynamic(object, key)?)
            .await
            .map_err(|e| classify_error(e, key))?;
        to_value(&replaced, key)
    }

    async fn delete(&self, key: &ResourceKey, propagation: Propagation) -> Result<(), StoreError> {
        let api = self.api(key).await?;
        let params = match propagation {
            Propagation::Background => DeleteParams::background(),
            Propagation::Foreground => DeleteParams::foreground(),
        };
        api.delete(&key.name, &params)
            .await
            .map_err(|e| classify_error(e, key))?;

        // Foreground deletion only sets a finalizer, the object stays visible
        // until the garbage collector has removed every dependent.
        if propagation == Propagation::Foreground {
            self.wait_until_deleted(&api, key).await?;
        }
        Ok(())
    }
}

/// Split `group/version` into its parts, the core group has no prefix
pub(crate) fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Map a kube error onto the store error the reconciler branches on
fn classify_error(err: kube::Error, key: &ResourceKey) -> StoreError {
    match err {
        kube::Error::Api(response) => {
            let detail = format!("{key}: {}", response.message);
            match (response.code, response.reason.as_str()) {
                (404, _) => StoreError::NotFound(detail),
                (409, "AlreadyExists") => StoreError::AlreadyExists(detail),
                (409, _) => StoreError::Conflict(detail),
                (422, _) | (_, "Invalid") => StoreError::Invalid(detail),
                (504, _) | (_, "Timeout") => StoreError::Timeout(detail),
                (code, reason) => StoreError::Api(format!("{detail} ({code} {reason})")),
            }
        }
        other => StoreError::Api(format!("{key}: {other}")),
    }
}

fn namespace_info(namespace: Namespace) -> NamespaceInfo {
    NamespaceInfo {
        name: namespace.metadata.name.unwrap_or_default(),
        labels: namespace.metadata.labels.unwrap_or_default(),
        phase: namespace.status.and_then(|status| status.phase),
    }
}

fn to_dynamic(object: &Value, key: &ResourceKey) -> Result<DynamicObject, StoreError> {
    serde_json::from_value(object.clone())
        .map_err(|e| StoreError::Invalid(format!("{key}: malformed object: {e}")))
}

fn to_value(object: &DynamicObject, key: &ResourceKey) -> Result<Value, StoreError> {
    serde_json::to_value(object)
        .map_err(|e| StoreError::Api(format!("{key}: unreadable response: {e}")))
}
