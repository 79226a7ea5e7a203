//! Lifecycle adapter: create / updated / remove with finalizer-backed deletion
//!
//! The adapter turns the raw deliveries of a [`GenericController`] into three
//! typed callbacks. The state it last reached is stored on the object as a
//! [`LifecycleState`] and read back together with the finalizer and the
//! deletion timestamp:
//!
//! ```text
//! Unmanaged --create ok, finalizer added--> Active --updated--> Active
//! Active --deletion requested--> Finalizing --remove ok--> Removed --finalizer released--> gone
//! ```
//!
//! A failed remove leaves the object in `Finalizing` with its finalizer in
//! place, so the key is retried and the object cannot disappear before
//! remove succeeds. A failing callback may hand back the object it was
//! working on; its status is written before the error is returned.
//!
//! Writes chain: every step continues from the object the API server
//! returned, and the finalizer is released with a patch, so no write carries
//! a `resourceVersion` older than the previous write.

use std::sync::Arc;

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, warn};

use super::generic::GenericController;
use crate::crd::LifecycleState;
use crate::{Error, Result};

/// Finalizer prefix for handlers registered on every object
pub const FINALIZER_PREFIX: &str = "controller.kontainer.dev/";

/// Finalizer prefix for handlers scoped to one cluster
pub const CLUSTER_SCOPED_FINALIZER_PREFIX: &str = "clusterscoped.controller.kontainer.dev/";

/// A resource whose lifecycle state is stored on the object
pub trait LifecycleObject:
    Resource<DynamicType = ()> + Clone + PartialEq + Send + Sync + 'static
{
    /// Stored lifecycle state
    fn lifecycle_state(&self) -> LifecycleState;

    /// Record a new lifecycle state
    fn set_lifecycle_state(&mut self, state: LifecycleState);
}

/// A failed lifecycle callback
#[derive(Debug)]
pub struct LifecycleError<K> {
    /// Object whose status should be recorded despite the failure
    pub object: Option<K>,
    /// What went wrong
    pub error: Error,
}

impl<K> LifecycleError<K> {
    /// Fail with `error`, recording the status of `object`
    pub fn with_object(object: K, error: Error) -> Self {
        Self {
            object: Some(object),
            error,
        }
    }
}

impl<K> From<Error> for LifecycleError<K> {
    fn from(error: Error) -> Self {
        Self {
            object: None,
            error,
        }
    }
}

/// Outcome of a lifecycle callback
pub type LifecycleResult<K> = std::result::Result<K, LifecycleError<K>>;

/// Typed callbacks driven by the adapter
///
/// Each callback receives an owned copy of the object and returns it with
/// any spec or status changes to persist.
#[async_trait]
pub trait Lifecycle<K>: Send + Sync {
    /// First delivery of an object that is not managed yet
    async fn create(&self, obj: K) -> LifecycleResult<K>;

    /// Any later delivery while the object is not being deleted
    async fn updated(&self, obj: K) -> LifecycleResult<K>;

    /// Deletion requested; release everything the object owns
    async fn remove(&self, obj: K) -> LifecycleResult<K>;
}

/// Write access to the API server for one resource type
#[async_trait]
pub trait ObjectClient<K>: Send + Sync {
    /// Persist metadata and spec, returning the stored object
    async fn update(&self, obj: &K) -> Result<K>;

    /// Persist the status subresource, returning the stored object
    async fn update_status(&self, obj: &K) -> Result<K>;

    /// Drop `finalizer` from the stored object, whatever its current version
    async fn remove_finalizer(&self, obj: &K, finalizer: &str) -> Result<K>;
}

/// What a delivery asks the adapter to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    /// Run create, then attach the finalizer
    Create,
    /// Run updated
    Update,
    /// Run remove, then release the finalizer
    Remove,
    /// Remove already succeeded; only release the finalizer
    Release,
    /// Nothing left for this adapter to do
    Skip,
}

/// Decide the next step from the stored state and what the object shows
pub fn next_step(state: LifecycleState, deleting: bool, has_finalizer: bool) -> Step {
    match (deleting, has_finalizer, state) {
        (true, false, _) => Step::Skip,
        (true, true, LifecycleState::Removed) => Step::Release,
        (true, true, _) => Step::Remove,
        (false, true, _) => Step::Update,
        (false, false, _) => Step::Create,
    }
}

/// Drives a [`Lifecycle`] for one controller registration
pub struct LifecycleAdapter<K> {
    name: String,
    finalizer: String,
    lifecycle: Arc<dyn Lifecycle<K>>,
    client: Arc<dyn ObjectClient<K>>,
}

impl<K: LifecycleObject> LifecycleAdapter<K> {
    /// Adapter whose finalizer is `controller.kontainer.dev/<name>`
    pub fn new(
        name: impl Into<String>,
        lifecycle: Arc<dyn Lifecycle<K>>,
        client: Arc<dyn ObjectClient<K>>,
    ) -> Self {
        let name = name.into();
        Self {
            finalizer: format!("{FINALIZER_PREFIX}{name}"),
            name,
            lifecycle,
            client,
        }
    }

    /// Adapter whose finalizer is `clusterscoped.controller.kontainer.dev/<name>_<cluster>`
    pub fn cluster_scoped(
        name: impl Into<String>,
        cluster_name: &str,
        lifecycle: Arc<dyn Lifecycle<K>>,
        client: Arc<dyn ObjectClient<K>>,
    ) -> Self {
        let name = format!("{}_{cluster_name}", name.into());
        Self {
            finalizer: format!("{CLUSTER_SCOPED_FINALIZER_PREFIX}{name}"),
            name,
            lifecycle,
            client,
        }
    }

    /// Register `lifecycle` as a handler named `name` on `controller`
    pub fn register(
        controller: &GenericController<K>,
        name: impl Into<String>,
        lifecycle: Arc<dyn Lifecycle<K>>,
        client: Arc<dyn ObjectClient<K>>,
    ) {
        let adapter = Arc::new(Self::new(name, lifecycle, client));
        let handler_name = adapter.name.clone();
        controller.add_handler(handler_name, move |_key, obj| {
            let adapter = adapter.clone();
            async move { adapter.sync(obj).await }
        });
    }

    /// Register `lifecycle` for the objects belonging to `cluster_name` only
    pub fn register_cluster_scoped(
        controller: &GenericController<K>,
        name: impl Into<String>,
        cluster_name: &str,
        lifecycle: Arc<dyn Lifecycle<K>>,
        client: Arc<dyn ObjectClient<K>>,
    ) {
        let adapter = Arc::new(Self::cluster_scoped(name, cluster_name, lifecycle, client));
        let handler_name = adapter.name.clone();
        controller.add_cluster_scoped_handler(handler_name, cluster_name, move |_key, obj| {
            let adapter = adapter.clone();
            async move { adapter.sync(obj).await }
        });
    }

    /// Finalizer this adapter owns
    pub fn finalizer(&self) -> &str {
        &self.finalizer
    }

    fn has_finalizer(&self, obj: &K) -> bool {
        obj.finalizers().iter().any(|f| *f == self.finalizer)
    }

    /// Handle one delivery; `None` means the object is already gone
    pub async fn sync(&self, obj: Option<Arc<K>>) -> Result<()> {
        let Some(obj) = obj else {
            return Ok(());
        };
        let obj = (*obj).clone();
        let state = obj.lifecycle_state();
        let step = next_step(
            state,
            obj.meta().deletion_timestamp.is_some(),
            self.has_finalizer(&obj),
        );
        debug!(lifecycle = %self.name, object = %obj.name_any(), %state, ?step, "lifecycle step");

        match step {
            Step::Skip => Ok(()),
            Step::Create => self.create(obj, state).await,
            Step::Update => self.update(obj).await,
            Step::Remove => self.remove(obj, state).await,
            Step::Release => self.release(obj).await,
        }
    }

    /// Unwrap a callback outcome, writing the status a failure carries
    async fn settle(&self, outcome: LifecycleResult<K>) -> Result<K> {
        match outcome {
            Ok(obj) => Ok(obj),
            Err(LifecycleError { object, error }) => {
                if let Some(obj) = object {
                    if let Err(e) = self.client.update_status(&obj).await {
                        warn!(
                            lifecycle = %self.name,
                            object = %obj.name_any(),
                            error = %e,
                            "failed to record status of failed callback"
                        );
                    }
                }
                Err(error)
            }
        }
    }

    async fn create(&self, obj: K, state: LifecycleState) -> Result<()> {
        if state == LifecycleState::Active {
            warn!(
                lifecycle = %self.name,
                object = %obj.name_any(),
                finalizer = %self.finalizer,
                "finalizer was removed from an active object, running create again"
            );
        }

        let mut created = self.settle(self.lifecycle.create(obj).await).await?;
        created.set_lifecycle_state(LifecycleState::Active);
        if !self.has_finalizer(&created) {
            created.finalizers_mut().push(self.finalizer.clone());
        }

        // Finalizer first: a lost status write is repaired by the next update
        self.client.update(&created).await?;
        self.client.update_status(&created).await?;
        info!(lifecycle = %self.name, object = %created.name_any(), "object is now managed");
        Ok(())
    }

    async fn update(&self, obj: K) -> Result<()> {
        let original = obj.clone();
        let mut updated = self.settle(self.lifecycle.updated(obj).await).await?;
        updated.set_lifecycle_state(LifecycleState::Active);

        if updated != original {
            self.client.update(&updated).await?;
            self.client.update_status(&updated).await?;
        }
        Ok(())
    }

    async fn remove(&self, mut obj: K, state: LifecycleState) -> Result<()> {
        if state != LifecycleState::Finalizing {
            obj.set_lifecycle_state(LifecycleState::Finalizing);
            obj = self.client.update_status(&obj).await?;
        }

        info!(lifecycle = %self.name, object = %obj.name_any(), "running remove");
        let mut removed = self.settle(self.lifecycle.remove(obj).await).await?;
        removed.set_lifecycle_state(LifecycleState::Removed);
        let removed = self.client.update_status(&removed).await?;

        self.release(removed).await
    }

    async fn release(&self, obj: K) -> Result<()> {
        self.client.remove_finalizer(&obj, &self.finalizer).await?;
        info!(lifecycle = %self.name, object = %obj.name_any(), "finalizer released");
        Ok(())
    }
}

/// In-memory stand-in for the API server used by lifecycle tests
///
/// Every write bumps `resourceVersion`. A replace carrying an older version
/// than the stored object is rejected with a 409 like the real server does;
/// status and finalizer patches apply to whatever is stored.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use kube::error::ErrorResponse;
    use kube::ResourceExt;
    use parking_lot::Mutex;

    use super::ObjectClient;
    use crate::crd::KontainerDriver;
    use crate::{Error, Result};

    #[derive(Default)]
    pub(crate) struct VersionedClient {
        objects: Mutex<HashMap<String, KontainerDriver>>,
        version: AtomicU64,
        pub(crate) updates: AtomicU32,
        pub(crate) status_updates: AtomicU32,
        pub(crate) finalizer_patches: AtomicU32,
    }

    fn api_error(code: u16, reason: &str, message: String) -> Error {
        Error::from(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message,
            reason: reason.to_string(),
            code,
        }))
    }

    impl VersionedClient {
        fn bump(&self, obj: &mut KontainerDriver) {
            let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
            obj.metadata.resource_version = Some(version.to_string());
        }

        /// Store `obj` as if a user had just created it
        pub(crate) fn seed(&self, mut obj: KontainerDriver) -> KontainerDriver {
            self.bump(&mut obj);
            self.objects.lock().insert(obj.name_any(), obj.clone());
            obj
        }

        /// Mark `name` for deletion the way the API server does with finalizers present
        pub(crate) fn request_deletion(&self, name: &str) -> KontainerDriver {
            let mut objects = self.objects.lock();
            let obj = objects.get_mut(name).expect("object was never seeded");
            obj.metadata.deletion_timestamp = Some(Time(Utc::now()));
            self.bump(obj);
            obj.clone()
        }

        pub(crate) fn stored(&self, name: &str) -> KontainerDriver {
            self.objects
                .lock()
                .get(name)
                .cloned()
                .expect("object was never seeded")
        }

        pub(crate) fn writes(&self) -> u32 {
            self.updates.load(Ordering::SeqCst)
                + self.status_updates.load(Ordering::SeqCst)
                + self.finalizer_patches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ObjectClient<KontainerDriver> for VersionedClient {
        async fn update(&self, obj: &KontainerDriver) -> Result<KontainerDriver> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            let name = obj.name_any();
            let mut objects = self.objects.lock();
            let Some(current) = objects.get(&name) else {
                return Err(api_error(404, "NotFound", format!("{name} not found")));
            };
            if current.metadata.resource_version != obj.metadata.resource_version {
                return Err(api_error(
                    409,
                    "Conflict",
                    format!("the object {name} has been modified"),
                ));
            }

            let mut next = obj.clone();
            next.status = current.status.clone();
            next.metadata.deletion_timestamp = current.metadata.deletion_timestamp.clone();
            self.bump(&mut next);
            objects.insert(name, next.clone());
            Ok(next)
        }

        async fn update_status(&self, obj: &KontainerDriver) -> Result<KontainerDriver> {
            self.status_updates.fetch_add(1, Ordering::SeqCst);
            let name = obj.name_any();
            let mut objects = self.objects.lock();
            let Some(current) = objects.get_mut(&name) else {
                return Err(api_error(404, "NotFound", format!("{name} not found")));
            };
            current.status = obj.status.clone();
            self.bump(current);
            Ok(current.clone())
        }

        async fn remove_finalizer(
            &self,
            obj: &KontainerDriver,
            finalizer: &str,
        ) -> Result<KontainerDriver> {
            self.finalizer_patches.fetch_add(1, Ordering::SeqCst);
            let name = obj.name_any();
            let mut objects = self.objects.lock();
            let Some(current) = objects.get_mut(&name) else {
                return Err(api_error(404, "NotFound", format!("{name} not found")));
            };
            current.finalizers_mut().retain(|f| f != finalizer);
            self.bump(current);
            Ok(current.clone())
        }
    }
}
