//! # Status Aggregation
//!
//! Turns the outcome of a run into the status written back to the policy.
//!
//! Conditions are merged by type: setting a condition overwrites the stored
//! one of the same type, and `lastTransitionTime` only moves when the
//! condition status actually changes. Together with the skip below, a policy
//! whose runs keep producing the same result never gets its status patched.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::run::RunOutcome;
use crate::crd::{Condition, ConditionStatus, ConditionType, SyncPolicy, SyncPolicyStatus};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use std::collections::HashMap;
use tracing::debug;

pub const REASON_SUCCEEDED: &str = "SynchronizationSucceeded";
pub const REASON_FAILED: &str = "SynchronizationFailed";
pub const REASON_FAILED_WITH_ERROR: &str = "FailedWithError";
pub const REASON_CONFIG_INVALID: &str = "ConfigInvalid";
pub const REASON_CONFIG_VALID: &str = "ConfigValid";

pub const MESSAGE_SUCCEEDED: &str = "Synchronization completed successfully";
pub const MESSAGE_FAILED: &str = "Synchronization failed";
pub const MESSAGE_NOTHING_SUCCEEDED: &str = "could not sync or delete any items";

/// Conditions keyed by type
///
/// Keeps the stored order for output and an index for overwrite by type.
#[derive(Debug, Clone, Default)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
    index: HashMap<ConditionType, usize>,
}

impl ConditionSet {
    /// Load stored conditions, a later duplicate of a type replaces an earlier one
    #[must_use]
    pub fn from_conditions(conditions: &[Condition]) -> Self {
        let mut set = Self::default();
        for condition in conditions {
            set.put(condition.clone());
        }
        set
    }

    fn put(&mut self, condition: Condition) {
        match self.index.get(&condition.r#type) {
            Some(&position) => self.conditions[position] = condition,
            None => {
                self.index.insert(condition.r#type, self.conditions.len());
                self.conditions.push(condition);
            }
        }
    }

    /// Set a condition, keeping the transition time when the status is unchanged
    pub fn set(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: &str,
    ) {
        let last_transition_time = match self.get(condition_type) {
            Some(existing) if existing.status == status => existing
                .last_transition_time
                .clone()
                .or_else(|| Some(now.to_string())),
            _ => Some(now.to_string()),
        };
        self.put(Condition {
            r#type: condition_type,
            status,
            last_transition_time,
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        });
    }

    pub fn remove(&mut self, condition_type: ConditionType) {
        if let Some(position) = self.index.remove(&condition_type) {
            self.conditions.remove(position);
            for slot in self.index.values_mut() {
                if *slot > position {
                    *slot -= 1;
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.index
            .get(&condition_type)
            .and_then(|&position| self.conditions.get(position))
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Condition> {
        self.conditions
    }
}

/// Compute the status to store after a run
///
/// Returns `None` when the stored status must be left untouched: after a
/// namespace fetch failure or a cancelled run.
#[must_use]
pub fn next_status(
    previous: Option<&SyncPolicyStatus>,
    outcome: &RunOutcome,
    generation: Option<i64>,
    now: &str,
) -> Option<SyncPolicyStatus> {
    let mut conditions =
        ConditionSet::from_conditions(previous.map_or(&[][..], |s| s.conditions.as_slice()));

    let counters = match outcome {
        RunOutcome::NamespaceFetchFailed(_) | RunOutcome::Cancelled(_) => return None,
        RunOutcome::Invalid(error) => {
            conditions.set(
                ConditionType::Invalid,
                ConditionStatus::True,
                REASON_CONFIG_INVALID,
                &error.to_string(),
                now,
            );
            conditions.set(
                ConditionType::Ready,
                ConditionStatus::False,
                REASON_FAILED,
                MESSAGE_FAILED,
                now,
            );
            Default::default()
        }
        RunOutcome::Completed { counters, .. } => {
            if conditions.get(ConditionType::Invalid).is_some() {
                conditions.set(
                    ConditionType::Invalid,
                    ConditionStatus::False,
                    REASON_CONFIG_VALID,
                    "Configuration is valid",
                    now,
                );
            }
            if counters.is_failed() {
                conditions.set(
                    ConditionType::Ready,
                    ConditionStatus::False,
                    REASON_FAILED,
                    MESSAGE_FAILED,
                    now,
                );
                conditions.set(
                    ConditionType::Errored,
                    ConditionStatus::True,
                    REASON_FAILED_WITH_ERROR,
                    MESSAGE_NOTHING_SUCCEEDED,
                    now,
                );
            } else {
                conditions.set(
                    ConditionType::Ready,
                    ConditionStatus::True,
                    REASON_SUCCEEDED,
                    MESSAGE_SUCCEEDED,
                    now,
                );
                conditions.remove(ConditionType::Errored);
            }
            *counters
        }
    };

    Some(SyncPolicyStatus {
        conditions: conditions.into_vec(),
        synchronized_item_count: counters.synced,
        deleted_item_count: counters.deleted,
        failed_item_count: counters.failed,
        observed_generation: generation,
    })
}

/// Write the status subresource, skipping the call when nothing changed
///
/// Returns whether a patch was sent.
pub async fn persist_status(
    client: &Client,
    policy: &SyncPolicy,
    status: &SyncPolicyStatus,
) -> Result<bool, kube::Error> {
    if policy.status.as_ref() == Some(status) {
        debug!("Skipping status update, status unchanged");
        return Ok(false);
    }

    let namespace = policy.metadata.namespace.as_deref().unwrap_or("default");
    let name = policy.metadata.name.as_deref().unwrap_or_default();
    let api: Api<SyncPolicy> = Api::namespaced(client.clone(), namespace);

    let patch = serde_json::json!({
        "status": status
    });
    let params = PatchParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PatchParams::default()
    };
    api.patch_status(name, &params, &Patch::Merge(patch)).await?;
    Ok(true)
}
