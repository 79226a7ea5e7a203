//! KontainerDriver Custom Resource Definition
//!
//! A KontainerDriver describes an installable driver binary: where to fetch
//! it, how to verify it and which port it should listen on. Built-in drivers
//! are compiled into the bridge and only need activating.

use chrono::Utc;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{set_condition, Condition, ConditionStatus, LifecycleState, CONDITION_ACTIVE};

/// Specification for a KontainerDriver
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kontainer.dev",
    version = "v1alpha1",
    kind = "KontainerDriver",
    plural = "kontainerdrivers",
    shortname = "kd",
    status = "KontainerDriverStatus",
    namespaced = false,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Display","type":"string","jsonPath":".spec.displayName"}"#,
    printcolumn = r#"{"name":"BuiltIn","type":"boolean","jsonPath":".spec.builtIn"}"#,
    printcolumn = r#"{"name":"Port","type":"integer","jsonPath":".spec.actualPort"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct KontainerDriverSpec {
    /// Human-readable driver name
    #[serde(default)]
    pub display_name: String,

    /// Where the driver binary should be fetched from
    #[serde(default, rename = "desiredURL")]
    pub desired_url: String,

    /// Where the currently installed binary was fetched from
    #[serde(default, rename = "actualURL")]
    pub actual_url: String,

    /// SHA-256 of the binary as lowercase hex; empty skips verification
    #[serde(default)]
    pub checksum: String,

    /// Port the driver should listen on (0 = pick one)
    #[serde(default)]
    pub desired_port: u16,

    /// Port the running driver listens on
    #[serde(default)]
    pub actual_port: u16,

    /// Compiled into the bridge; nothing to download
    #[serde(default)]
    pub built_in: bool,
}

impl KontainerDriverSpec {
    /// Returns true if the installed binary no longer matches the desired one
    pub fn needs_install(&self) -> bool {
        !self.built_in && (self.actual_url != self.desired_url || self.actual_port == 0)
    }
}

/// Status for a KontainerDriver
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KontainerDriverStatus {
    /// Where the lifecycle adapter is with this object
    #[serde(default)]
    pub lifecycle: LifecycleState,

    /// Conditions representing the driver state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl KontainerDriverStatus {
    /// Add or update a condition, stamped with the current time
    pub fn condition(mut self, condition: Condition) -> Self {
        self.set_condition(condition);
        self
    }

    /// Add or update a condition in place, stamped with the current time
    pub fn set_condition(&mut self, condition: Condition) {
        set_condition(&mut self.conditions, condition, Utc::now());
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Returns true if the driver is marked active
    pub fn is_active(&self) -> bool {
        self.get_condition(CONDITION_ACTIVE)
            .is_some_and(Condition::is_true)
    }

    /// Returns the status of `type_`, Unknown when absent
    pub fn condition_status(&self, type_: &str) -> ConditionStatus {
        self.get_condition(type_)
            .map(|c| c.status.clone())
            .unwrap_or_default()
    }
}
