//! # Namespace Events
//!
//! Re-runs policies against a namespace that was created or changed, so a
//! new namespace receives its items without waiting for the next interval.

use crate::controller::reconciler::reconcile::reconcile_scoped;
use crate::controller::reconciler::types::{
    policy_key, Reconciler, ReconcilerError, TriggerSource, NAMESPACE_KEY_PREFIX,
};
use crate::controller::store::NamespaceInfo;
use crate::crd::SyncPolicy;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube_runtime::controller::Action;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Reconcile entry point for the Namespace controller
///
/// Inactive namespaces are ignored. Every policy in the watched scope is
/// reconciled with the namespace as its only candidate; each policy still
/// applies its own selector.
pub async fn reconcile_namespace(
    namespace: Arc<Namespace>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = namespace
        .metadata
        .name
        .as_deref()
        .ok_or(ReconcilerError::MissingMetadata("name"))?;
    let info = NamespaceInfo {
        name: name.to_string(),
        labels: namespace.metadata.labels.clone().unwrap_or_default(),
        phase: namespace.status.as_ref().and_then(|s| s.phase.clone()),
    };

    if !info.is_active() {
        debug!(
            namespace = %name,
            phase = info.phase.as_deref().unwrap_or("Unknown"),
            "Namespace is not active, ignoring"
        );
        return Ok(Action::await_change());
    }

    let policies: Api<SyncPolicy> = match &ctx.config.watch_namespace {
        Some(watch_namespace) => Api::namespaced(ctx.client.clone(), watch_namespace),
        None => Api::all(ctx.client.clone()),
    };
    let list = policies
        .list(&ListParams::default())
        .await
        .map_err(ReconcilerError::PolicyList)?;

    info!(namespace = %name, policies = list.items.len(), "Reconciling from namespace event");

    // The listing is the authoritative set of policies, state of the rest is dropped
    let live: HashSet<String> = list
        .items
        .iter()
        .filter_map(|policy| {
            Some(policy_key(
                policy.metadata.namespace.as_deref()?,
                policy.metadata.name.as_deref()?,
            ))
        })
        .collect();
    ctx.states.retain_policies(&live);

    let mut first_error = None;
    for policy in &list.items {
        if let Err(e) =
            reconcile_scoped(policy, &ctx, Some(name), TriggerSource::NamespaceEvent).await
        {
            error!(
                namespace = %name,
                policy.name = policy.metadata.name.as_deref().unwrap_or_default(),
                policy.namespace = policy.metadata.namespace.as_deref().unwrap_or_default(),
                error = %e,
                "Scoped reconciliation failed"
            );
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => {
            ctx.reset_backoff(&format!("{NAMESPACE_KEY_PREFIX}{name}"));
            Ok(Action::await_change())
        }
    }
}
