//! Controllers for kontainer custom resources
//!
//! A [`GenericController`] mirrors a watch stream into a reflector store and
//! feeds object keys through a rate-limited [`WorkQueue`] to named handlers. The
//! [`LifecycleAdapter`] layers create / updated / remove callbacks with
//! finalizer-backed deletion on top of it.

pub mod generic;
pub mod kontainer_driver;
pub mod kube;
pub mod lifecycle;
pub mod queue;

use std::sync::Arc;

use ::kube::{Api, Client};
use tokio_util::sync::CancellationToken;

pub use generic::{in_cluster, object_key, GenericController, CLUSTER_NAME_LABEL};
pub use kontainer_driver::KontainerDriverLifecycle;
pub use lifecycle::{
    Lifecycle, LifecycleAdapter, LifecycleError, LifecycleObject, LifecycleResult, ObjectClient,
};
pub use queue::WorkQueue;

use self::kube::{watch_events, KubeObjectClient};
use crate::config::ControllerConfig;
use crate::crd::KontainerDriver;
use crate::install::DriverInstaller;
use crate::plugin::SharedPluginRegistry;

/// Name of the KontainerDriver lifecycle handler and its finalizer suffix
pub const KONTAINER_DRIVER_LIFECYCLE: &str = "kontainer-driver-lifecycle";

/// Reconcile KontainerDriver objects until `token` is cancelled
pub async fn run_kontainer_driver_controller(
    client: Client,
    registry: SharedPluginRegistry,
    installer: Arc<dyn DriverInstaller>,
    config: ControllerConfig,
    token: CancellationToken,
) {
    let api: Api<KontainerDriver> = Api::all(client);
    let controller = Arc::new(GenericController::new("kontainer-driver-controller", config));

    LifecycleAdapter::register(
        &controller,
        KONTAINER_DRIVER_LIFECYCLE,
        Arc::new(KontainerDriverLifecycle::new(registry, installer)),
        Arc::new(KubeObjectClient::new(api.clone())),
    );

    controller.run(watch_events(api), token).await;
}
