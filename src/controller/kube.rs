//! kube-rs bindings for the generic controller
//!
//! [`watch_events`] is a backed-off `kube::runtime::watcher` stream whose
//! events feed the controller's reflector store. [`KubeObjectClient`]
//! persists lifecycle changes through a typed `Api`.

use std::fmt::Debug;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::lifecycle::ObjectClient;
use crate::{Error, Result};

/// Field manager used for status and finalizer patches
pub const FIELD_MANAGER: &str = "kontainer-bridge";

/// Watch every object of `api`
///
/// The watch backs off and reconnects on its own; errors are passed through
/// for logging.
pub fn watch_events<K>(api: Api<K>) -> impl Stream<Item = Result<Event<K>>> + Send
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .map(|event| event.map_err(Error::from))
}

/// Merge patch setting `metadata.finalizers` to `finalizers` without `finalizer`
pub fn finalizer_removal_patch(finalizers: &[String], finalizer: &str) -> Value {
    let kept: Vec<&String> = finalizers.iter().filter(|f| *f != finalizer).collect();
    json!({ "metadata": { "finalizers": kept } })
}

/// [`ObjectClient`] backed by the API server
pub struct KubeObjectClient<K> {
    api: Api<K>,
}

impl<K> KubeObjectClient<K> {
    /// Persist through `api`
    pub fn new(api: Api<K>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl<K> ObjectClient<K> for KubeObjectClient<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn update(&self, obj: &K) -> Result<K> {
        debug!(object = %obj.name_any(), "replacing object");
        Ok(self
            .api
            .replace(&obj.name_any(), &PostParams::default(), obj)
            .await?)
    }

    async fn update_status(&self, obj: &K) -> Result<K> {
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or_default();
        debug!(object = %obj.name_any(), "patching status");
        Ok(self
            .api
            .patch_status(
                &obj.name_any(),
                &PatchParams::apply(FIELD_MANAGER),
                &Patch::Merge(json!({ "status": status })),
            )
            .await?)
    }

    async fn remove_finalizer(&self, obj: &K, finalizer: &str) -> Result<K> {
        let name = obj.name_any();
        let current = self.api.get(&name).await?;
        let patch = finalizer_removal_patch(current.finalizers(), finalizer);
        debug!(object = %name, %finalizer, "removing finalizer");
        Ok(self
            .api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_removal_patch_keeps_other_finalizers() {
        let patch = finalizer_removal_patch(
            &names(&["controller.kontainer.dev/a", "other.io/keep"]),
            "controller.kontainer.dev/a",
        );
        assert_eq!(patch, json!({"metadata": {"finalizers": ["other.io/keep"]}}));
    }

    #[test]
    fn test_removing_last_finalizer_sends_an_empty_list() {
        let patch = finalizer_removal_patch(&names(&["controller.kontainer.dev/a"]), "controller.kontainer.dev/a");
        assert_eq!(patch, json!({"metadata": {"finalizers": []}}));
    }

    #[test]
    fn test_absent_finalizer_leaves_list_untouched() {
        let patch = finalizer_removal_patch(&names(&["other.io/keep"]), "controller.kontainer.dev/a");
        assert_eq!(patch, json!({"metadata": {"finalizers": ["other.io/keep"]}}));
    }
}
