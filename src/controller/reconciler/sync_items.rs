//! # Item Synchronization
//!
//! Create-or-update of one manifest in one namespace, with the
//! force-recreate fallback for updates rejected as invalid.

use crate::controller::reconciler::substitution::{substitute_project_name, SubstitutionError};
use crate::controller::store::{ObjectStore, Propagation, ResourceKey, StoreError};
use crate::crd::Manifest;
use serde_json::Value;
use tracing::{debug, info};

/// Metadata owned by the API server, carried over from the live object on update
const PRESERVED_METADATA: &[&str] = &[
    "resourceVersion",
    "uid",
    "generation",
    "managedFields",
    "ownerReferences",
    "creationTimestamp",
    "deletionTimestamp",
];

/// How a manifest reached its desired state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Created,
    Updated,
    Recreated,
}

impl SyncOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Recreated => "recreated",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ItemSyncError {
    #[error("manifest is missing {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),
    #[error("create failed: {0}")]
    Create(#[source] StoreError),
    #[error("reading existing object failed: {0}")]
    Fetch(#[source] StoreError),
    #[error("update failed: {0}")]
    Update(#[source] StoreError),
    #[error("recreate failed deleting the existing object: {0}")]
    RecreateDelete(#[source] StoreError),
    #[error("recreate failed creating the object: {0}")]
    RecreateCreate(#[source] StoreError),
}

/// Build the per-namespace copy of a manifest
///
/// The namespace is overwritten and the placeholder substituted. The
/// template is left untouched.
pub fn render_manifest(
    manifest: &Manifest,
    namespace: &str,
) -> Result<(ResourceKey, Value), ItemSyncError> {
    let identity = manifest.identity().map_err(ItemSyncError::MissingField)?;
    let mut desired = manifest.instantiate(namespace);
    substitute_project_name(&mut desired, namespace)?;

    // Identity is read after substitution, names may carry the placeholder
    let name = desired
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .unwrap_or(&identity.name)
        .to_string();
    let key = ResourceKey::new(identity.api_version, identity.kind, namespace, name);
    Ok((key, desired))
}

/// Converge one manifest into one namespace
pub async fn sync_item(
    store: &dyn ObjectStore,
    manifest: &Manifest,
    namespace: &str,
    force_recreate: bool,
) -> Result<(ResourceKey, SyncOutcome), ItemSyncError> {
    let (key, desired) = render_manifest(manifest, namespace)?;
    let outcome = apply(store, &key, &desired, force_recreate).await?;
    Ok((key, outcome))
}

async fn apply(
    store: &dyn ObjectStore,
    key: &ResourceKey,
    desired: &Value,
    force_recreate: bool,
) -> Result<SyncOutcome, ItemSyncError> {
    match store.create(key, desired).await {
        Ok(_) => return Ok(SyncOutcome::Created),
        Err(e) if e.is_already_exists() => {
            debug!(object.kind = %key.kind, object.namespace = %key.namespace, object.name = %key.name, "Object exists, updating");
        }
        Err(e) => return Err(ItemSyncError::Create(e)),
    }

    let existing = store.get(key).await.map_err(ItemSyncError::Fetch)?;
    let update = merge_preserving_system_fields(desired, &existing);

    match store.replace(key, &update).await {
        Ok(_) => Ok(SyncOutcome::Updated),
        Err(e) if e.is_invalid() && force_recreate => {
            info!(
                object.kind = %key.kind,
                object.namespace = %key.namespace,
                object.name = %key.name,
                error = %e,
                "Update rejected as invalid, recreating"
            );
            recreate(store, key, desired).await?;
            Ok(SyncOutcome::Recreated)
        }
        Err(e) => Err(ItemSyncError::Update(e)),
    }
}

/// Delete with foreground propagation, then create from scratch
///
/// `desired` carries no resourceVersion, so neither call is version-guarded.
async fn recreate(
    store: &dyn ObjectStore,
    key: &ResourceKey,
    desired: &Value,
) -> Result<(), ItemSyncError> {
    match store.delete(key, Propagation::Foreground).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {
            debug!(object.kind = %key.kind, object.namespace = %key.namespace, object.name = %key.name, "Object vanished before recreate");
        }
        Err(e) => return Err(ItemSyncError::RecreateDelete(e)),
    }

    let fresh = strip_system_fields(desired.clone());
    store
        .create(key, &fresh)
        .await
        .map(|_| ())
        .map_err(ItemSyncError::RecreateCreate)
}

/// Overlay the desired document on the live object's system-managed metadata
///
/// Everything else comes from `desired`, fields absent from it are dropped.
#[must_use]
pub fn merge_preserving_system_fields(desired: &Value, existing: &Value) -> Value {
    let mut merged = desired.clone();
    let Some(existing_metadata) = existing.get("metadata").and_then(Value::as_object) else {
        return merged;
    };
    if let Some(metadata) = merged.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in PRESERVED_METADATA {
            if let Some(value) = existing_metadata.get(*field) {
                metadata.insert((*field).to_string(), value.clone());
            }
        }
    }
    merged
}

fn strip_system_fields(mut object: Value) -> Value {
    if let Some(metadata) = object.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in PRESERVED_METADATA {
            metadata.remove(*field);
        }
    }
    object
}
