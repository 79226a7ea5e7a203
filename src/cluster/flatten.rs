//! Config flattening engine
//!
//! Walks a nested, dynamically typed configuration document and sorts every
//! leaf into an [`OptionBag`] by value kind. Nested objects are merged into
//! the same bag without namespacing, so a key deeper in the tree overwrites a
//! colliding key seen earlier. The `labels` object is the one exception: it is
//! rendered as a `key=value` string list instead of being recursed into.

use serde_json::{Map, Number, Value};
use tracing::warn;

use super::spec::ClusterSpec;
use crate::options::OptionBag;
use crate::Error;

/// Key whose object value is rendered as `key=value` pairs
pub const LABELS_KEY: &str = "labels";

/// Option always carrying the cluster name
pub const NAME_OPTION: &str = "name";

/// Option always carrying the display name
pub const DISPLAY_NAME_OPTION: &str = "displayName";

/// Flatten `data` into `bag`
///
/// Unsupported leaves (null, lists that are empty or hold anything but
/// strings) are logged and dropped; flattening itself never fails.
pub fn flatten(data: &Map<String, Value>, bag: &mut OptionBag) {
    for (key, value) in data {
        match value {
            Value::Number(n) => bag.set_int(key, number_to_i64(n)),
            Value::String(s) => bag.set_string(key, s),
            Value::Bool(b) => bag.set_bool(key, *b),
            Value::Array(items) => match string_list(items) {
                Some(list) => bag.set_string_slice(key, list),
                None => warn!(key = %key, value = %value, "dropping list that is not a non-empty list of strings"),
            },
            Value::Object(labels) if key == LABELS_KEY => {
                bag.set_string_slice(key, label_pairs(labels));
            }
            Value::Object(nested) => flatten(nested, bag),
            Value::Null => warn!(key = %key, "could not convert null option"),
        }
    }
}

/// Translate a cluster spec into the option bag for its driver
///
/// `name` and `displayName` are written after flattening and override any
/// colliding key from the document.
pub fn driver_options(cluster_name: &str, spec: &ClusterSpec) -> Result<OptionBag, Error> {
    let document = spec.engine()?.to_document()?;

    let mut bag = OptionBag::new();
    flatten(&document, &mut bag);

    bag.set_string(NAME_OPTION, cluster_name);
    bag.set_string(DISPLAY_NAME_OPTION, spec.display_name_or(cluster_name));

    Ok(bag)
}

/// Integers pass through; floats truncate toward zero and saturate at the i64 range
fn number_to_i64(n: &Number) -> i64 {
    match n.as_i64() {
        Some(i) => i,
        None => n.as_f64().map(|f| f as i64).unwrap_or_default(),
    }
}

fn string_list(items: &[Value]) -> Option<Vec<String>> {
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn label_pairs(labels: &Map<String, Value>) -> Vec<String> {
    labels
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;
    use serde_json::json;
    use std::collections::HashSet;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("fixture must be an object"),
        }
    }

    fn flattened(value: Value) -> OptionBag {
        let mut bag = OptionBag::new();
        flatten(&object(value), &mut bag);
        bag
    }

    // =========================================================================
    // Leaf Classification
    // =========================================================================

    #[test]
    fn test_scalars_land_in_their_category() {
        let bag = flattened(json!({
            "zone": "us-east-1",
            "nodeCount": 3,
            "private": true
        }));

        assert_eq!(bag.string("zone"), Some("us-east-1"));
        assert_eq!(bag.int("nodeCount"), Some(3));
        assert_eq!(bag.bool("private"), Some(true));
        assert_eq!(bag.len(), 3);
    }

    #[test]
    fn test_floats_truncate_toward_zero() {
        let bag = flattened(json!({"up": 2.9, "down": -2.9, "exact": 3.0}));
        assert_eq!(bag.int("up"), Some(2));
        assert_eq!(bag.int("down"), Some(-2));
        assert_eq!(bag.int("exact"), Some(3));
    }

    #[test]
    fn test_out_of_range_numbers_saturate() {
        let bag = flattened(json!({"huge": u64::MAX, "tiny": -1.0e300}));
        assert_eq!(bag.int("huge"), Some(i64::MAX));
        assert_eq!(bag.int("tiny"), Some(i64::MIN));
    }

    #[test]
    fn test_string_lists_are_kept_in_order() {
        let bag = flattened(json!({"subnets": ["b", "a", "c"]}));
        assert_eq!(
            bag.string_slice("subnets"),
            Some(&["b".to_string(), "a".to_string(), "c".to_string()][..])
        );
    }

    #[test]
    fn test_lossy_lists_are_dropped() {
        let bag = flattened(json!({
            "empty": [],
            "numbers": [1, 2],
            "mixed": ["a", 1],
            "nested": [["a"]]
        }));
        assert!(bag.is_empty(), "unexpected options: {bag:?}");
    }

    #[test]
    fn test_null_is_dropped() {
        let bag = flattened(json!({"region": null, "zone": "a"}));
        assert_eq!(bag.get("region"), None);
        assert_eq!(bag.len(), 1);
    }

    // =========================================================================
    // Nesting and Labels
    // =========================================================================

    #[test]
    fn test_nested_objects_merge_without_prefix() {
        let bag = flattened(json!({"network": {"vpc": "vpc-1", "ipv6": false}}));
        assert_eq!(bag.string("vpc"), Some("vpc-1"));
        assert_eq!(bag.bool("ipv6"), Some(false));
        assert_eq!(bag.get("network"), None);
    }

    #[test]
    fn test_nested_collision_keeps_a_single_category() {
        // "a" sorts before "z", so the nested write happens last
        let bag = flattened(json!({"a": {"size": "large"}, "size": 1, "z": {"size": true}}));
        assert_eq!(bag.get("size"), Some(OptionValue::Bool(true)));
        assert_eq!(bag.len(), 1);
    }

    #[test]
    fn test_labels_become_key_value_pairs() {
        let bag = flattened(json!({"labels": {"env": "prod", "tier": "web", "shard": 3}}));

        let got: HashSet<String> = bag
            .string_slice("labels")
            .expect("labels should be present")
            .iter()
            .cloned()
            .collect();
        let want: HashSet<String> = ["env=prod", "tier=web", "shard=3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(got, want);
        assert_eq!(bag.string("env"), None, "labels must not be recursed into");
    }

    #[test]
    fn test_empty_labels_yield_an_empty_list() {
        let bag = flattened(json!({"labels": {}}));
        assert_eq!(bag.string_slice("labels"), Some(&[][..]));
    }

    // =========================================================================
    // Translation
    // =========================================================================

    /// Story: the documented end-to-end translation
    #[test]
    fn story_generic_config_translates_to_driver_options() {
        let spec = ClusterSpec::generic(
            "",
            object(json!({
                "driverName": "mydriver",
                "replicas": 3.0,
                "labels": {"env": "prod"},
                "nested": {"x": "y"}
            })),
        );

        let bag = driver_options("c1", &spec).unwrap();

        assert_eq!(bag.int("replicas"), Some(3));
        assert_eq!(bag.string_slice("labels"), Some(&["env=prod".to_string()][..]));
        assert_eq!(bag.string("x"), Some("y"));
        assert_eq!(bag.string("name"), Some("c1"));
        assert_eq!(bag.string("displayName"), Some("c1"));
        assert_eq!(bag.string("driverName"), Some("mydriver"));
        assert_eq!(bag.len(), 6);
    }

    #[test]
    fn test_identity_options_override_the_document() {
        let spec = ClusterSpec::generic(
            "Production",
            object(json!({
                "driverName": "mydriver",
                "name": 42,
                "inner": {"displayName": ["x"]}
            })),
        );

        let bag = driver_options("c1", &spec).unwrap();

        assert_eq!(bag.get("name"), Some(OptionValue::String("c1".into())));
        assert_eq!(
            bag.get("displayName"),
            Some(OptionValue::String("Production".into()))
        );
    }

    #[test]
    fn test_imported_config_flattens_kubeconfig() {
        let spec = ClusterSpec::imported("", "apiVersion: v1");
        let bag = driver_options("edge", &spec).unwrap();
        assert_eq!(bag.string("kubeConfig"), Some("apiVersion: v1"));
        assert_eq!(bag.string("name"), Some("edge"));
    }

    #[test]
    fn test_translation_fails_without_engine_config() {
        let err = driver_options("c1", &ClusterSpec::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
