//! # SyncPolicy Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the SyncPolicy resource
///
/// Counters are a snapshot of the latest reconciliation, not lifetime totals.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicyStatus {
    /// Conditions represent the latest available observations
    /// At most one condition per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Number of items created, updated or recreated during the latest reconciliation
    #[serde(default)]
    pub synchronized_item_count: i64,
    /// Number of items deleted during the latest reconciliation
    #[serde(default)]
    pub deleted_item_count: i64,
    /// Number of items that failed during the latest reconciliation
    #[serde(default)]
    pub failed_item_count: i64,
    /// Generation of the spec the status was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: ConditionType,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last time the status changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine readable reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

/// Condition types reported on a SyncPolicy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionType {
    /// The latest reconciliation synced or deleted at least one item, or had nothing fail
    Ready,
    /// Every attempted item failed during the latest reconciliation
    Errored,
    /// The spec could not be parsed
    Invalid,
}

/// Status of a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Ready => "Ready",
            ConditionType::Errored => "Errored",
            ConditionType::Invalid => "Invalid",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

impl SyncPolicyStatus {
    /// Look up a condition by type
    #[must_use]
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.r#type == condition_type)
    }

    /// True when a condition of the given type exists with status True
    #[must_use]
    pub fn is_condition_true(&self, condition_type: ConditionType) -> bool {
        self.condition(condition_type)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }
}
