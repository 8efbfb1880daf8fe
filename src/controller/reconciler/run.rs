//! # Reconciliation Run
//!
//! One execution of the sync algorithm against one policy snapshot:
//! validate, resolve namespaces, then delete and sync items namespace by
//! namespace. Item failures are counted, never propagated.

use crate::controller::reconciler::delete_items::{delete_item, delete_key, DeleteOutcome};
use crate::controller::reconciler::namespaces::{target_namespaces, NamespaceResolver};
use crate::controller::reconciler::sync_items::{sync_item, SyncOutcome};
use crate::controller::reconciler::validation::{validate_spec, ValidationError};
use crate::controller::store::{NamespaceInfo, ObjectStore, StoreError};
use crate::crd::SyncPolicySpec;
use crate::observability::metrics;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Item counters of a single run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub synced: i64,
    pub deleted: i64,
    pub failed: i64,
}

impl RunCounters {
    /// Nothing was synced or deleted but something failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        self.synced == 0 && self.deleted == 0 && self.failed > 0
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The spec was rejected, nothing was touched
    Invalid(ValidationError),
    /// The namespace set could not be fetched, nothing was touched
    NamespaceFetchFailed(StoreError),
    /// Shutdown was requested mid-run
    Cancelled(RunCounters),
    /// Every target namespace was processed
    Completed {
        counters: RunCounters,
        namespaces: usize,
    },
}

/// State of one run, never shared between runs
#[derive(Debug)]
pub struct ReconciliationRun<'a> {
    store: &'a dyn ObjectStore,
    spec: &'a SyncPolicySpec,
    cancel: &'a AtomicBool,
    counters: RunCounters,
}

impl<'a> ReconciliationRun<'a> {
    pub fn new(store: &'a dyn ObjectStore, spec: &'a SyncPolicySpec, cancel: &'a AtomicBool) -> Self {
        Self {
            store,
            spec,
            cancel,
            counters: RunCounters::default(),
        }
    }

    /// Execute the run
    ///
    /// With a `scope`, only that namespace is considered as a candidate.
    pub async fn execute(mut self, scope: Option<&str>) -> RunOutcome {
        let resolver: NamespaceResolver = match validate_spec(self.spec) {
            Ok(resolver) => resolver,
            Err(e) => return RunOutcome::Invalid(e),
        };

        let namespaces = match target_namespaces(self.store, &resolver, scope).await {
            Ok(namespaces) => namespaces,
            Err(e) => return RunOutcome::NamespaceFetchFailed(e),
        };
        debug!(count = namespaces.len(), "Resolved target namespaces");
        if scope.is_none() {
            metrics::set_namespaces_targeted(namespaces.len());
        }

        for namespace in &namespaces {
            if self.is_cancelled() {
                return RunOutcome::Cancelled(self.counters);
            }
            // Deletes run before syncs in every namespace
            if !self.delete_items(namespace).await || !self.sync_items(namespace).await {
                return RunOutcome::Cancelled(self.counters);
            }
        }

        RunOutcome::Completed {
            counters: self.counters,
            namespaces: namespaces.len(),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Returns false when the run was cancelled
    async fn delete_items(&mut self, namespace: &NamespaceInfo) -> bool {
        let spec = self.spec;
        for item in &spec.delete_items {
            if self.is_cancelled() {
                return false;
            }
            let result = match delete_key(item, &namespace.name) {
                Ok(key) => delete_item(self.store, &key).await.map(|outcome| (key, outcome)),
                Err(e) => Err(e),
            };
            match result {
                Ok((key, DeleteOutcome::Deleted)) => {
                    self.counters.deleted += 1;
                    metrics::increment_items_deleted();
                    info!(
                        object.kind = %key.kind,
                        object.namespace = %key.namespace,
                        object.name = %key.name,
                        "Deleted"
                    );
                }
                Ok((key, DeleteOutcome::Absent)) => {
                    debug!(
                        object.kind = %key.kind,
                        object.namespace = %key.namespace,
                        object.name = %key.name,
                        "Already absent"
                    );
                }
                Err(e) => {
                    self.counters.failed += 1;
                    metrics::increment_items_failed();
                    warn!(
                        object.kind = %item.kind,
                        object.namespace = %namespace.name,
                        object.name = %item.name,
                        error = %e,
                        "Error deleting"
                    );
                }
            }
        }
        true
    }

    /// Returns false when the run was cancelled
    async fn sync_items(&mut self, namespace: &NamespaceInfo) -> bool {
        let spec = self.spec;
        for manifest in &spec.sync_items {
            if self.is_cancelled() {
                return false;
            }
            match sync_item(self.store, manifest, &namespace.name, spec.force_recreate).await {
                Ok((key, outcome)) => {
                    self.counters.synced += 1;
                    metrics::increment_items_synchronized();
                    if outcome == SyncOutcome::Recreated {
                        metrics::increment_force_recreates();
                    }
                    info!(
                        object.kind = %key.kind,
                        object.namespace = %key.namespace,
                        object.name = %key.name,
                        outcome = outcome.as_str(),
                        "Synchronized"
                    );
                }
                Err(e) => {
                    self.counters.failed += 1;
                    metrics::increment_items_failed();
                    let identity = manifest.identity().ok();
                    warn!(
                        object.kind = identity.as_ref().map_or("", |i| i.kind.as_str()),
                        object.namespace = %namespace.name,
                        object.name = identity.as_ref().map_or("", |i| i.name.as_str()),
                        error = %e,
                        "Error synchronizing"
                    );
                }
            }
        }
        true
    }
}
