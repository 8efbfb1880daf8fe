//! # Item Deletion
//!
//! Removes a resource identified by coordinates from one namespace.

use crate::controller::store::{ObjectStore, Propagation, ResourceKey, StoreError};
use crate::crd::DeleteRef;

/// Result of a delete that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete, not counted
    Absent,
}

#[derive(Debug, thiserror::Error)]
pub enum ItemDeleteError {
    #[error("delete reference is missing {0}")]
    MissingField(&'static str),
    #[error("delete failed: {0}")]
    Delete(#[source] StoreError),
}

/// Key of a delete reference inside `namespace`
pub fn delete_key(item: &DeleteRef, namespace: &str) -> Result<ResourceKey, ItemDeleteError> {
    if item.api_version.is_empty() {
        return Err(ItemDeleteError::MissingField("apiVersion"));
    }
    if item.kind.is_empty() {
        return Err(ItemDeleteError::MissingField("kind"));
    }
    if item.name.is_empty() {
        return Err(ItemDeleteError::MissingField("name"));
    }
    Ok(ResourceKey::new(
        &item.api_version,
        &item.kind,
        namespace,
        &item.name,
    ))
}

/// Delete one resource with background propagation
///
/// A resource that does not exist is reported as [`DeleteOutcome::Absent`].
pub async fn delete_item(
    store: &dyn ObjectStore,
    key: &ResourceKey,
) -> Result<DeleteOutcome, ItemDeleteError> {
    match store.delete(key, Propagation::Background).await {
        Ok(()) => Ok(DeleteOutcome::Deleted),
        Err(e) if e.is_not_found() => Ok(DeleteOutcome::Absent),
        Err(e) => Err(ItemDeleteError::Delete(e)),
    }
}
