//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::store::{KubeObjectStore, ObjectStore, StoreError};
use kube::Client;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The namespace set could not be fetched, retried after a fixed delay
    #[error("Fetching namespaces failed: {0}")]
    NamespaceFetch(#[source] StoreError),
    #[error("Updating status failed: {0}")]
    StatusUpdate(#[source] kube::Error),
    #[error("Listing sync policies failed: {0}")]
    PolicyList(#[source] kube::Error),
    #[error("Resource is missing metadata.{0}")]
    MissingMetadata(&'static str),
}

impl ReconcilerError {
    /// Short label used for metrics and logs
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::NamespaceFetch(_) => "namespace-fetch",
            ReconcilerError::StatusUpdate(_) => "status-update",
            ReconcilerError::PolicyList(_) => "policy-list",
            ReconcilerError::MissingMetadata(_) => "missing-metadata",
        }
    }
}

/// Trigger source for reconciliation
/// Tracks why a reconciliation was triggered for better debugging and observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Policy watch event or periodic requeue
    PolicyEvent,
    /// A namespace changed, the run is scoped to that namespace
    NamespaceEvent,
}

impl TriggerSource {
    /// Get human-readable string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::PolicyEvent => "policy-event",
            TriggerSource::NamespaceEvent => "namespace-event",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone, Default)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Last full run of a policy that reached every target namespace
#[derive(Debug, Clone, Copy)]
pub struct CompletedRun {
    pub generation: Option<i64>,
    pub finished_at: Instant,
}

/// Per-policy bookkeeping shared by both controllers
///
/// Keys are `namespace/name` for policies and `namespace:{name}` for
/// namespace-controller errors.
#[derive(Debug, Default)]
pub struct PolicyStates {
    backoffs: Mutex<HashMap<String, BackoffState>>,
    // Both controllers can run the same policy, the lock keeps runs of one policy sequential
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    completed_runs: Mutex<HashMap<String, CompletedRun>>,
}

fn lock_map<V>(map: &Mutex<V>) -> MutexGuard<'_, V> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PolicyStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the run lock of a key
    pub fn lock_for(&self, resource_key: &str) -> Arc<AsyncMutex<()>> {
        lock_map(&self.locks)
            .entry(resource_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drop the run lock once no other run holds or waits for it
    ///
    /// Must be called after the guard of `lock` was dropped.
    pub fn release_lock(&self, resource_key: &str, lock: &Arc<AsyncMutex<()>>) {
        let mut locks = lock_map(&self.locks);
        let unused = locks
            .get(resource_key)
            .is_some_and(|stored| Arc::ptr_eq(stored, lock) && Arc::strong_count(lock) == 2);
        if unused {
            locks.remove(resource_key);
        }
    }

    /// Advance the backoff of a key and return the delay to wait
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        let mut backoffs = lock_map(&self.backoffs);
        let state = backoffs.entry(resource_key.to_string()).or_default();
        state.increment_error();
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Forget the backoff of a key after a successful run
    pub fn reset_backoff(&self, resource_key: &str) {
        lock_map(&self.backoffs).remove(resource_key);
    }

    pub fn record_completed_run(&self, resource_key: &str, generation: Option<i64>, finished_at: Instant) {
        lock_map(&self.completed_runs).insert(
            resource_key.to_string(),
            CompletedRun {
                generation,
                finished_at,
            },
        );
    }

    /// Remaining wait when a run of the same generation finished less than `interval` ago
    ///
    /// Status patches wake the policy controller without a spec change; those
    /// wake-ups are answered with the rest of the interval instead of a run.
    pub fn remaining_interval(
        &self,
        resource_key: &str,
        generation: Option<i64>,
        interval: Duration,
        now: Instant,
    ) -> Option<Duration> {
        let runs = lock_map(&self.completed_runs);
        let run = runs.get(resource_key)?;
        if run.generation != generation {
            return None;
        }
        interval
            .checked_sub(now.saturating_duration_since(run.finished_at))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Drop the state of policies that no longer exist
    ///
    /// Namespace keys and locks currently in use are kept.
    pub fn retain_policies(&self, live: &HashSet<String>) {
        let keep = |key: &String| key.starts_with(NAMESPACE_KEY_PREFIX) || live.contains(key);
        lock_map(&self.backoffs).retain(|key, _| keep(key));
        lock_map(&self.completed_runs).retain(|key, _| keep(key));
        lock_map(&self.locks).retain(|key, lock| keep(key) || Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> (usize, usize, usize) {
        (
            lock_map(&self.backoffs).len(),
            lock_map(&self.locks).len(),
            lock_map(&self.completed_runs).len(),
        )
    }
}

/// Prefix of the backoff keys of the namespace controller
pub const NAMESPACE_KEY_PREFIX: &str = "namespace:";

/// Key under which a policy's state is tracked
#[must_use]
pub fn policy_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Shared context of the policy and namespace controllers
#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<ControllerConfig>,
    pub states: Arc<PolicyStates>,
    // Checked between namespaces and items so runs stop promptly on shutdown
    pub shutdown: Arc<AtomicBool>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(KubeObjectStore::new(client.clone()));
        Self::with_store(client, store, config)
    }

    /// Build a reconciler on a custom object store
    pub fn with_store(client: Client, store: Arc<dyn ObjectStore>, config: ControllerConfig) -> Self {
        Self {
            client,
            store,
            config: Arc::new(config),
            states: Arc::new(PolicyStates::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Advance the backoff of a policy and return the delay to wait
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        self.states.next_backoff(resource_key)
    }

    /// Forget the backoff of a policy after a successful run
    pub fn reset_backoff(&self, resource_key: &str) {
        self.states.reset_backoff(resource_key);
    }

    /// Stop in-flight runs at the next namespace or item boundary
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
