//! Supporting types for the KontainerDriver CRD

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Driver binary has been fetched and verified
pub const CONDITION_DOWNLOADED: &str = "Downloaded";
/// Driver binary is installed and running
pub const CONDITION_INSTALLED: &str = "Installed";
/// Driver is reachable through the plugin registry
pub const CONDITION_ACTIVE: &str = "Active";
/// Driver has been deactivated
pub const CONDITION_INACTIVE: &str = "Inactive";

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., Downloaded, Active)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition was written
    pub last_update_time: DateTime<Utc>,

    /// Last time the status value changed
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_update_time: now,
            last_transition_time: now,
        }
    }

    /// Returns true if the condition has status True
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Replace-by-type update of a condition list
///
/// At most one entry per type is kept. `last_update_time` advances on every
/// write; `last_transition_time` only moves when the status changes. Neither
/// timestamp ever goes backwards, even if `now` is earlier than the stored one.
pub fn set_condition(conditions: &mut Vec<Condition>, update: Condition, now: DateTime<Utc>) {
    match conditions.iter_mut().find(|c| c.type_ == update.type_) {
        Some(existing) => {
            let now = now.max(existing.last_update_time);
            if existing.status != update.status {
                existing.last_transition_time = now.max(existing.last_transition_time);
            }
            existing.status = update.status;
            existing.reason = update.reason;
            existing.message = update.message;
            existing.last_update_time = now;
        }
        None => conditions.push(Condition {
            last_update_time: now,
            last_transition_time: now,
            ..update
        }),
    }
}

/// Lifecycle state of a resource managed through the lifecycle adapter
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LifecycleState {
    /// Create has not completed yet
    #[default]
    Unmanaged,
    /// Create completed and the finalizer is attached
    Active,
    /// Deletion requested, remove has not completed yet
    Finalizing,
    /// Remove completed, the finalizer is being released
    Removed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unmanaged => write!(f, "Unmanaged"),
            Self::Active => write!(f, "Active"),
            Self::Finalizing => write!(f, "Finalizing"),
            Self::Removed => write!(f, "Removed"),
        }
    }
}
