//! # Leader Election
//!
//! Lease based leader election (`coordination.k8s.io/v1`). Only the leader
//! runs the watch loop.
//!
//! Every write carries the resourceVersion that was read, so two replicas
//! racing for an expired lease cannot both win: the loser gets 409 Conflict
//! and keeps waiting.

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Api, PostParams};
use kube::Client;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const LEASE_DURATION: Duration = Duration::from_secs(30);
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum LeaderElectionError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("lease serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lease {0} has no resourceVersion")]
    MissingResourceVersion(String),
}

/// What to do with the lease as it was read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseDecision {
    /// No lease exists yet
    Create,
    /// We hold the lease
    Renew,
    /// The holder stopped renewing
    TakeOver { transitions: i64 },
    /// Someone else holds a live lease
    Wait,
}

/// Decide from the JSON form of a lease
#[must_use]
pub fn decide(lease: Option<&Value>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(lease) = lease else {
        return LeaseDecision::Create;
    };
    let spec = &lease["spec"];
    if spec["holderIdentity"].as_str() == Some(identity) {
        return LeaseDecision::Renew;
    }

    let renew_time = spec["renewTime"]
        .as_str()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    let duration = spec["leaseDurationSeconds"].as_i64();
    let expired = match (renew_time, duration) {
        (Some(renewed), Some(secs)) => now > renewed + chrono::Duration::seconds(secs),
        _ => true,
    };

    if expired || spec["holderIdentity"].is_null() {
        LeaseDecision::TakeOver {
            transitions: spec["leaseTransitions"].as_i64().unwrap_or(0),
        }
    } else {
        LeaseDecision::Wait
    }
}

fn micro_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Identity of this replica, the pod name when running in a cluster
#[must_use]
pub fn default_identity() -> String {
    std::env::var("POD_NAME")
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("sync-policy-controller-{}", uuid::Uuid::new_v4()))
}

pub struct LeaderElector {
    client: Client,
    lease_name: String,
    namespace: String,
    identity: String,
}

impl fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderElector")
            .field("lease_name", &self.lease_name)
            .field("namespace", &self.namespace)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    pub fn new(client: Client, lease_name: &str, namespace: &str, identity: &str) -> Self {
        Self {
            client,
            lease_name: lease_name.to_string(),
            namespace: namespace.to_string(),
            identity: identity.to_string(),
        }
    }

    fn api(&self) -> Api<Lease> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Block until leadership is acquired
    pub async fn acquire(self: Arc<Self>) -> LeaderGuard {
        info!(
            identity = %self.identity,
            lease = %self.lease_name,
            namespace = %self.namespace,
            "Waiting for leadership"
        );
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    info!(identity = %self.identity, "Leadership acquired");
                    return self.create_guard();
                }
                Ok(false) => {
                    debug!(identity = %self.identity, "Lease held by another replica");
                }
                Err(e) => {
                    warn!(identity = %self.identity, error = %e, "Failed to acquire lease, retrying");
                }
            }
            tokio::time::sleep(RETRY_INTERVAL).await;
        }
    }

    fn create_guard(self: &Arc<Self>) -> LeaderGuard {
        let (lost_tx, lost_rx) = oneshot::channel();
        let elector = Arc::clone(self);
        let renewal_task = tokio::spawn(async move {
            elector.renewal_loop(lost_tx).await;
        });
        LeaderGuard {
            elector: Arc::clone(self),
            renewal_task,
            lost_rx: Some(lost_rx),
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        let api = self.api();
        let now = Utc::now();

        let existing = match api.get(&self.lease_name).await {
            Ok(lease) => Some(serde_json::to_value(lease)?),
            Err(kube::Error::Api(e)) if e.code == 404 => None,
            Err(e) => return Err(e.into()),
        };

        match decide(existing.as_ref(), &self.identity, now) {
            LeaseDecision::Create => self.create_lease(&api, now).await,
            LeaseDecision::Wait => Ok(false),
            LeaseDecision::Renew => {
                let mut lease = existing.unwrap_or(Value::Null);
                let resource_version = self.resource_version(&lease)?;
                lease["spec"]["renewTime"] = json!(micro_time(now));
                lease["metadata"]["resourceVersion"] = json!(resource_version);
                self.replace_lease(&api, lease).await
            }
            LeaseDecision::TakeOver { transitions } => {
                let resource_version =
                    self.resource_version(existing.as_ref().unwrap_or(&Value::Null))?;
                let lease = self.lease_body(now, transitions + 1, Some(resource_version));
                let acquired = self.replace_lease(&api, lease).await?;
                if acquired {
                    info!(identity = %self.identity, transitions = transitions + 1, "Took over expired lease");
                }
                Ok(acquired)
            }
        }
    }

    fn resource_version(&self, lease: &Value) -> Result<String, LeaderElectionError> {
        lease["metadata"]["resourceVersion"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LeaderElectionError::MissingResourceVersion(self.lease_name.clone()))
    }

    fn lease_body(&self, now: DateTime<Utc>, transitions: i64, resource_version: Option<String>) -> Value {
        let mut metadata = json!({
            "name": self.lease_name,
            "namespace": self.namespace,
        });
        if let Some(rv) = resource_version {
            metadata["resourceVersion"] = json!(rv);
        }
        json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": metadata,
            "spec": {
                "holderIdentity": self.identity,
                "leaseDurationSeconds": LEASE_DURATION.as_secs(),
                "acquireTime": micro_time(now),
                "renewTime": micro_time(now),
                "leaseTransitions": transitions,
            }
        })
    }

    async fn create_lease(&self, api: &Api<Lease>, now: DateTime<Utc>) -> Result<bool, LeaderElectionError> {
        let lease: Lease = serde_json::from_value(self.lease_body(now, 0, None))?;
        match api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!(identity = %self.identity, "Created new lease");
                Ok(true)
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_lease(&self, api: &Api<Lease>, lease: Value) -> Result<bool, LeaderElectionError> {
        let lease: Lease = serde_json::from_value(lease)?;
        match api.replace(&self.lease_name, &PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                debug!(identity = %self.identity, "Lease changed since it was read");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn renewal_loop(&self, lost_tx: oneshot::Sender<()>) {
        loop {
            tokio::time::sleep(RENEW_INTERVAL).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => debug!(identity = %self.identity, "Lease renewed"),
                Ok(false) | Err(_) => {
                    warn!(identity = %self.identity, "Leadership lost");
                    let _ = lost_tx.send(());
                    return;
                }
            }
        }
    }

    /// Clear the holder so a standby can take over without waiting for expiry
    async fn release(&self) -> Result<(), LeaderElectionError> {
        let api = self.api();
        let lease = match api.get(&self.lease_name).await {
            Ok(lease) => serde_json::to_value(lease)?,
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if lease["spec"]["holderIdentity"].as_str() != Some(self.identity.as_str()) {
            return Ok(());
        }

        let mut released = lease;
        released["spec"]["holderIdentity"] = Value::Null;
        released["spec"]["renewTime"] = json!(micro_time(Utc::now() - chrono::Duration::seconds(60)));
        self.replace_lease(&api, released).await?;
        info!(identity = %self.identity, "Lease released");
        Ok(())
    }
}

/// Held while this replica is the leader
///
/// The lease is renewed in the background until the guard is dropped.
pub struct LeaderGuard {
    elector: Arc<LeaderElector>,
    renewal_task: JoinHandle<()>,
    lost_rx: Option<oneshot::Receiver<()>>,
}

impl fmt::Debug for LeaderGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeaderGuard")
            .field("elector", &self.elector)
            .field("renewal_finished", &self.renewal_task.is_finished())
            .finish_non_exhaustive()
    }
}

impl LeaderGuard {
    /// Wait until leadership is lost
    pub async fn lost(&mut self) {
        if let Some(rx) = self.lost_rx.take() {
            let _ = rx.await;
        }
    }

    /// Give up leadership during a graceful shutdown
    pub async fn release(self) {
        self.renewal_task.abort();
        if let Err(e) = self.elector.release().await {
            warn!(error = %e, "Failed to release lease");
        }
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        self.renewal_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_debug<T: fmt::Debug>() {}

    #[test]
    fn test_election_types_implement_debug() {
        assert_debug::<LeaderElector>();
        assert_debug::<LeaderGuard>();
    }

    fn lease(holder: Option<&str>, renewed: DateTime<Utc>) -> Value {
        json!({
            "metadata": {"name": "leader", "resourceVersion": "7"},
            "spec": {
                "holderIdentity": holder,
                "leaseDurationSeconds": 30,
                "renewTime": micro_time(renewed),
                "leaseTransitions": 2,
            }
        })
    }

    #[test]
    fn test_missing_lease_is_created() {
        assert_eq!(decide(None, "a", Utc::now()), LeaseDecision::Create);
    }

    #[test]
    fn test_own_lease_is_renewed() {
        let now = Utc::now();
        assert_eq!(decide(Some(&lease(Some("a"), now)), "a", now), LeaseDecision::Renew);
    }

    #[test]
    fn test_live_lease_of_another_replica_is_respected() {
        let now = Utc::now();
        let held = lease(Some("b"), now - chrono::Duration::seconds(10));
        assert_eq!(decide(Some(&held), "a", now), LeaseDecision::Wait);
    }

    #[test]
    fn test_expired_lease_is_taken_over() {
        let now = Utc::now();
        let stale = lease(Some("b"), now - chrono::Duration::seconds(31));
        assert_eq!(
            decide(Some(&stale), "a", now),
            LeaseDecision::TakeOver { transitions: 2 }
        );
    }

    #[test]
    fn test_released_lease_is_taken_over() {
        let now = Utc::now();
        let released = lease(None, now);
        assert_eq!(
            decide(Some(&released), "a", now),
            LeaseDecision::TakeOver { transitions: 2 }
        );
    }

    #[test]
    fn test_micro_time_is_rfc3339() {
        let parsed = DateTime::parse_from_rfc3339(&micro_time(Utc::now()));
        assert!(parsed.is_ok());
    }
}
