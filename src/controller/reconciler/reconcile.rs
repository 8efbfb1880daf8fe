//! # Reconcile
//!
//! Entry points called by the policy controller and the namespace controller.

use crate::controller::reconciler::run::{ReconciliationRun, RunOutcome};
use crate::controller::reconciler::status::{next_status, persist_status};
use crate::controller::reconciler::types::{policy_key, Reconciler, ReconcilerError, TriggerSource};
use crate::controller::store::ObjectStore;
use crate::crd::{SyncPolicy, SyncPolicyStatus};
use crate::observability::metrics;
use kube_runtime::controller::Action;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Result of reconciling one policy snapshot
#[derive(Debug)]
pub struct PolicyReconciliation {
    pub outcome: RunOutcome,
    /// Status to store, `None` when the stored status must not change
    pub status: Option<SyncPolicyStatus>,
}

/// Run a policy against a store and compute its next status
///
/// Performs every item side effect but does not write the status. Scoped
/// runs only see one namespace, so they leave the status to the full runs.
pub async fn reconcile_policy(
    store: &dyn ObjectStore,
    policy: &SyncPolicy,
    scope: Option<&str>,
    cancel: &AtomicBool,
) -> PolicyReconciliation {
    let outcome = ReconciliationRun::new(store, &policy.spec, cancel)
        .execute(scope)
        .await;
    if scope.is_some() {
        return PolicyReconciliation {
            outcome,
            status: None,
        };
    }
    let now = chrono::Utc::now().to_rfc3339();
    let status = next_status(
        policy.status.as_ref(),
        &outcome,
        policy.metadata.generation,
        &now,
    );
    PolicyReconciliation { outcome, status }
}

/// Reconcile entry point for the SyncPolicy controller
pub async fn reconcile(
    policy: Arc<SyncPolicy>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    reconcile_scoped(&policy, &ctx, None, TriggerSource::PolicyEvent).await
}

/// Reconcile a policy, optionally restricted to a single candidate namespace
pub(crate) async fn reconcile_scoped(
    policy: &SyncPolicy,
    ctx: &Reconciler,
    scope: Option<&str>,
    trigger: TriggerSource,
) -> Result<Action, ReconcilerError> {
    let name = policy
        .metadata
        .name
        .as_deref()
        .ok_or(ReconcilerError::MissingMetadata("name"))?;
    let namespace = policy
        .metadata
        .namespace
        .as_deref()
        .ok_or(ReconcilerError::MissingMetadata("namespace"))?;

    let span = info_span!(
        "reconcile",
        policy.name = %name,
        policy.namespace = %namespace,
        trigger = trigger.as_str(),
        scope = scope.unwrap_or("*"),
    );

    async move {
        let resource_key = policy_key(namespace, name);
        let lock = ctx.states.lock_for(&resource_key);
        let result = {
            let _guard = lock.lock().await;
            run_locked(policy, ctx, scope, &resource_key).await
        };
        ctx.states.release_lock(&resource_key, &lock);
        result
    }
    .instrument(span)
    .await
}

async fn run_locked(
    policy: &SyncPolicy,
    ctx: &Reconciler,
    scope: Option<&str>,
    resource_key: &str,
) -> Result<Action, ReconcilerError> {
    let generation = policy.metadata.generation;
    if scope.is_none() {
        // Status patches wake the controller without a spec change
        if let Some(remaining) = ctx.states.remaining_interval(
            resource_key,
            generation,
            ctx.config.reconcile_interval,
            Instant::now(),
        ) {
            debug!(
                generation,
                remaining_secs = remaining.as_secs(),
                "Generation unchanged since the last run, waiting for the interval"
            );
            return Ok(Action::requeue(remaining));
        }
    }

    let start = Instant::now();
    metrics::increment_reconciliations();
    info!("Reconciling");

    let result = reconcile_policy(ctx.store.as_ref(), policy, scope, &ctx.shutdown).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if let Some(status) = &result.status {
        persist_status(&ctx.client, policy, status)
            .await
            .map_err(ReconcilerError::StatusUpdate)?;
    }

    match result.outcome {
        RunOutcome::Invalid(error) => {
            warn!(error = %error, "Policy is invalid, waiting for a spec change");
            if scope.is_none() {
                ctx.reset_backoff(resource_key);
            }
            Ok(Action::await_change())
        }
        RunOutcome::NamespaceFetchFailed(error) => Err(ReconcilerError::NamespaceFetch(error)),
        RunOutcome::Cancelled(counters) => {
            info!(
                synced = counters.synced,
                deleted = counters.deleted,
                failed = counters.failed,
                "Reconciliation cancelled by shutdown"
            );
            Ok(Action::await_change())
        }
        RunOutcome::Completed {
            counters,
            namespaces,
        } => {
            if counters.failed > 0 {
                warn!(failed = counters.failed, "Encountered item errors");
            }
            info!(
                namespaces,
                synced = counters.synced,
                deleted = counters.deleted,
                failed = counters.failed,
                "Reconciliation finished"
            );
            if scope.is_some() {
                return Ok(Action::await_change());
            }
            ctx.reset_backoff(resource_key);
            ctx.states
                .record_completed_run(resource_key, generation, Instant::now());
            metrics::increment_requeues("interval");
            Ok(Action::requeue(ctx.config.reconcile_interval))
        }
    }
}
