//! Cluster specification handed to the facade
//!
//! A spec carries a display name and exactly one embedded engine
//! configuration. Which one is set decides the driver that serves the cluster.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Error;

/// Driver name used for imported clusters
pub const IMPORT_DRIVER: &str = "import";

/// Key inside a generic engine config naming the driver
pub const DRIVER_NAME_KEY: &str = "driverName";

/// Configuration of an imported (externally provisioned) cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImportedConfig {
    /// Kubeconfig used to reach the imported cluster
    #[serde(default)]
    pub kube_config: String,
}

/// Input document for a cluster lifecycle call
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Human-readable name; falls back to the cluster name when empty
    #[serde(default)]
    pub display_name: String,

    /// Set for imported clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_config: Option<ImportedConfig>,

    /// Free-form engine configuration for driver-provisioned clusters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic_engine_config: Option<Map<String, Value>>,
}

/// The authoritative engine configuration of a spec
#[derive(Clone, Debug, PartialEq)]
pub enum EngineConfig<'a> {
    /// Imported cluster, served by the `import` driver
    Imported(&'a ImportedConfig),
    /// Driver-provisioned cluster
    Generic {
        /// Value of `driverName` in the config
        driver_name: String,
        /// The whole config document
        config: &'a Map<String, Value>,
    },
}

impl EngineConfig<'_> {
    /// Name of the driver that serves this configuration
    pub fn driver_name(&self) -> &str {
        match self {
            Self::Imported(_) => IMPORT_DRIVER,
            Self::Generic { driver_name, .. } => driver_name,
        }
    }

    /// The configuration as a JSON object ready for flattening
    pub fn to_document(&self) -> Result<Map<String, Value>, Error> {
        let value = match self {
            Self::Imported(config) => serde_json::to_value(config)?,
            Self::Generic { config, .. } => Value::Object((*config).clone()),
        };
        match value {
            Value::Object(map) => Ok(map),
            other => Err(Error::serialization(format!(
                "engine config must be an object, got {other}"
            ))),
        }
    }
}

impl ClusterSpec {
    /// Create a spec for a driver-provisioned cluster
    pub fn generic(display_name: impl Into<String>, config: Map<String, Value>) -> Self {
        Self {
            display_name: display_name.into(),
            imported_config: None,
            generic_engine_config: Some(config),
        }
    }

    /// Create a spec for an imported cluster
    pub fn imported(display_name: impl Into<String>, kube_config: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            imported_config: Some(ImportedConfig {
                kube_config: kube_config.into(),
            }),
            generic_engine_config: None,
        }
    }

    /// Resolve which embedded configuration is authoritative
    pub fn engine(&self) -> Result<EngineConfig<'_>, Error> {
        match (&self.imported_config, &self.generic_engine_config) {
            (Some(_), Some(_)) => Err(Error::config(
                "both importedConfig and genericEngineConfig are set",
            )),
            (Some(imported), None) => Ok(EngineConfig::Imported(imported)),
            (None, Some(config)) => {
                let driver_name = match config.get(DRIVER_NAME_KEY) {
                    Some(Value::String(name)) if !name.is_empty() => name.clone(),
                    Some(Value::String(_)) | None => {
                        return Err(Error::config("no driver name supplied"))
                    }
                    Some(other) => {
                        return Err(Error::config(format!(
                            "driverName must be a string, got {other}"
                        )))
                    }
                };
                Ok(EngineConfig::Generic {
                    driver_name,
                    config,
                })
            }
            (None, None) => Err(Error::config("no driver config found")),
        }
    }

    /// Display name, or the cluster name when unset
    pub fn display_name_or<'a>(&'a self, cluster_name: &'a str) -> &'a str {
        if self.display_name.is_empty() {
            cluster_name
        } else {
            &self.display_name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    #[test]
    fn test_imported_spec_uses_import_driver() {
        let spec = ClusterSpec::imported("", "apiVersion: v1");
        let engine = spec.engine().unwrap();
        assert_eq!(engine.driver_name(), IMPORT_DRIVER);

        let doc = engine.to_document().unwrap();
        assert_eq!(doc.get("kubeConfig"), Some(&json!("apiVersion: v1")));
    }

    #[test]
    fn test_generic_spec_reads_driver_name() {
        let spec = ClusterSpec::generic(
            "Prod",
            object(json!({"driverName": "mydriver", "replicas": 3})),
        );
        assert_eq!(spec.engine().unwrap().driver_name(), "mydriver");
    }

    #[test]
    fn test_missing_engine_config_is_a_config_error() {
        let err = ClusterSpec::default().engine().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("no driver config found"));
    }

    #[test]
    fn test_both_engine_configs_are_rejected() {
        let mut spec = ClusterSpec::imported("", "cfg");
        spec.generic_engine_config = Some(object(json!({"driverName": "x"})));
        assert!(matches!(spec.engine(), Err(Error::Config(_))));
    }

    #[test]
    fn test_generic_without_driver_name_is_rejected() {
        let empty = ClusterSpec::generic("", object(json!({"driverName": ""})));
        assert!(matches!(empty.engine(), Err(Error::Config(_))));

        let missing = ClusterSpec::generic("", object(json!({"replicas": 1})));
        assert!(matches!(missing.engine(), Err(Error::Config(_))));

        let wrong_type = ClusterSpec::generic("", object(json!({"driverName": 7})));
        assert!(matches!(wrong_type.engine(), Err(Error::Config(_))));
    }

    #[test]
    fn test_display_name_falls_back_to_cluster_name() {
        let spec = ClusterSpec::imported("", "cfg");
        assert_eq!(spec.display_name_or("c1"), "c1");

        let named = ClusterSpec::imported("Production", "cfg");
        assert_eq!(named.display_name_or("c1"), "Production");
    }

    #[test]
    fn test_spec_deserializes_from_camel_case() {
        let spec: ClusterSpec = serde_json::from_value(json!({
            "displayName": "Edge",
            "genericEngineConfig": {"driverName": "mydriver"}
        }))
        .unwrap();
        assert_eq!(spec.display_name, "Edge");
        assert_eq!(spec.engine().unwrap().driver_name(), "mydriver");
    }
}
