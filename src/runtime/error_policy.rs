//! # Error Policy
//!
//! Requeue decisions for failed reconciliations and classification of
//! watch stream errors.

use crate::controller::reconciler::{policy_key, Reconciler, ReconcilerError, NAMESPACE_KEY_PREFIX};
use crate::crd::SyncPolicy;
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Namespace;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

/// Error policy of the SyncPolicy controller
///
/// A failed namespace fetch is retried after the fixed `NAMESPACE_FETCH_RETRY`
/// delay. Every other error advances the policy's Fibonacci backoff.
pub fn handle_policy_error(
    policy: Arc<SyncPolicy>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = policy.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = policy.metadata.namespace.as_deref().unwrap_or("default");
    requeue_after_error(&ctx, &policy_key(namespace, name), error)
}

/// Error policy of the Namespace controller
pub fn handle_namespace_error(
    namespace: Arc<Namespace>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = namespace.metadata.name.as_deref().unwrap_or("unknown");
    requeue_after_error(&ctx, &format!("{NAMESPACE_KEY_PREFIX}{name}"), error)
}

fn requeue_after_error(ctx: &Reconciler, resource_key: &str, error: &ReconcilerError) -> Action {
    metrics::increment_reconciliation_errors(error.kind());

    if let ReconcilerError::NamespaceFetch(_) = error {
        let delay = ctx.config.namespace_fetch_retry;
        warn!(
            resource = resource_key,
            error = %error,
            retry_secs = delay.as_secs(),
            "Namespace list unavailable, retrying after fixed delay"
        );
        metrics::increment_requeues("namespace-fetch");
        return Action::requeue(delay);
    }

    let (delay, error_count) = ctx.next_backoff(resource_key);
    error!(
        resource = resource_key,
        error = %error,
        error.kind = error.kind(),
        error_count,
        retry_secs = delay.as_secs(),
        "Reconciliation error, retrying with backoff"
    );
    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// Kind of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// 401, credentials or RBAC revoked
    Unauthorized,
    /// 404, the CRD or the object went away
    NotFound,
    /// 410, resource version too old
    Expired,
    /// 429, API server storage reinitializing or throttling
    TooManyRequests,
    Other,
}

impl WatchErrorClass {
    /// Whether the stream should be torn down and started again
    #[must_use]
    pub fn restarts_stream(self) -> bool {
        !matches!(self, WatchErrorClass::NotFound)
    }
}

/// Classify a watch error from its debug rendering
///
/// 404 is checked before 401 because a plain-text 404 body surfaces as a
/// decode error that also mentions `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error: &str) -> WatchErrorClass {
    let is_not_found =
        error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
    if is_not_found {
        return WatchErrorClass::NotFound;
    }
    if error.contains("401") || error.contains("Unauthorized") {
        return WatchErrorClass::Unauthorized;
    }
    if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        return WatchErrorClass::Expired;
    }
    if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        return WatchErrorClass::TooManyRequests;
    }
    WatchErrorClass::Other
}

/// Shared exponential backoff for watch stream restarts
#[derive(Debug)]
pub struct WatchBackoff {
    current_ms: AtomicU64,
    start_ms: u64,
    max_ms: u64,
}

impl WatchBackoff {
    #[must_use]
    pub fn new(start_ms: u64, max_ms: u64) -> Self {
        Self {
            current_ms: AtomicU64::new(start_ms),
            start_ms,
            max_ms: max_ms.max(start_ms),
        }
    }

    /// Current delay, doubling the next one up to the maximum
    pub fn next_delay(&self) -> Duration {
        let current = self.current_ms.load(Ordering::Relaxed);
        let next = current.saturating_mul(2).min(self.max_ms);
        self.current_ms.store(next, Ordering::Relaxed);
        Duration::from_millis(current)
    }

    pub fn reset(&self) {
        self.current_ms.store(self.start_ms, Ordering::Relaxed);
    }
}

/// Log a watch stream error and wait before the stream is restarted
///
/// Returns `true` when the caller should restart the stream.
pub async fn handle_watch_stream_error(
    controller: &str,
    error: &str,
    backoff: &WatchBackoff,
    restart_delay: Duration,
) -> bool {
    let class = classify_watch_error(error);
    match class {
        WatchErrorClass::Unauthorized => {
            error!(
                controller,
                error,
                "Watch authentication failed (401), check the ClusterRole and ServiceAccount token"
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::Expired => {
            warn!(controller, "Watch resource version expired (410), restarting watch");
        }
        WatchErrorClass::TooManyRequests => {
            let delay = backoff.next_delay();
            warn!(
                controller,
                backoff_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "API server storage reinitializing (429), backing off before restart"
            );
            tokio::time::sleep(delay).await;
        }
        WatchErrorClass::NotFound => {
            warn!(
                controller,
                error,
                "Resource not found (404), the object was deleted or the CRD is missing"
            );
        }
        WatchErrorClass::Other => {
            error!(controller, error, "Controller stream error");
            tokio::time::sleep(restart_delay).await;
        }
    }
    class.restarts_stream()
}
