//! # SyncPolicy Spec
//!
//! Main CRD specification types and default values.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use serde::{Deserialize, Serialize};

/// SyncPolicy Custom Resource Definition
///
/// Describes a set of manifests to converge into, and a set of named resources
/// to remove from, every namespace selected by `namespaceSelector`.
///
/// # Example
///
/// ```yaml
/// apiVersion: sync.octopilot.io/v1alpha1
/// kind: SyncPolicy
/// metadata:
///   name: team-defaults
///   namespace: octopilot-system
/// spec:
///   forceRecreate: false
///   namespaceSelector:
///     matchNames:
///       - "team-.*"
///     ignoreNames:
///       - "team-sandbox"
///   syncItems:
///     - apiVersion: v1
///       kind: ConfigMap
///       metadata:
///         name: project-info
///       data:
///         project: ${PROJECT_NAME}
///   deleteItems:
///     - apiVersion: v1
///       kind: ConfigMap
///       name: legacy-info
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "SyncPolicy",
    group = "sync.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::SyncPolicyStatus",
    shortname = "syncpol",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"integer", "jsonPath":".status.synchronizedItemCount"}, {"name":"Deleted", "type":"integer", "jsonPath":".status.deletedItemCount"}, {"name":"Failed", "type":"integer", "jsonPath":".status.failedItemCount"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicySpec {
    /// Delete and recreate objects whose update is rejected as invalid
    /// (typically because an immutable field changed)
    /// Default: false
    #[serde(default = "default_false")]
    pub force_recreate: bool,
    /// Selects the namespaces the items are synced into and deleted from
    #[serde(default)]
    pub namespace_selector: Option<NamespaceSelector>,
    /// Manifests created or updated in every selected namespace
    /// The literal `${PROJECT_NAME}` in any string value is replaced with the namespace name
    #[serde(default)]
    pub sync_items: Vec<crate::crd::Manifest>,
    /// Resources deleted from every selected namespace
    #[serde(default)]
    pub delete_items: Vec<DeleteRef>,
}

/// Namespace selection
///
/// A namespace is selected when it matches `labelSelector` or one of
/// `matchNames`, unless it matches one of `ignoreNames`.
/// Patterns are regular expressions anchored at both ends.
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSelector {
    /// Label selector evaluated against namespace labels
    #[serde(default)]
    pub label_selector: Option<LabelSelector>,
    /// Namespace name patterns to include
    #[serde(default)]
    pub match_names: Vec<String>,
    /// Namespace name patterns to exclude, takes precedence over every other rule
    #[serde(default)]
    pub ignore_names: Vec<String>,
}

/// Coordinates of a resource to delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRef {
    /// Name of the resource
    pub name: String,
    /// Kind of the resource (e.g. `ConfigMap`)
    pub kind: String,
    /// API version of the resource (e.g. `v1`, `apps/v1`)
    pub api_version: String,
}

/// Default value for boolean false
pub fn default_false() -> bool {
    false
}

impl NamespaceSelector {
    /// True when neither a label selector nor any name pattern is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.label_selector.is_none() && self.match_names.is_empty()
    }
}
