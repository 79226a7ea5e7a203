//! Cluster facade: one call in, one driver round-trip out
//!
//! Every operation resolves the spec's driver, translates the spec into an
//! option bag and resolves the driver address before it opens a connection.
//! A configuration or resolution error therefore never reaches the network.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::flatten::driver_options;
use super::spec::ClusterSpec;
use super::store::ClusterStore;
use crate::driver::CallContext;
use crate::options::OptionBag;
use crate::plugin::client::DriverClient;
use crate::plugin::SharedPluginRegistry;
use crate::proto::{ClusterInfo, DriverFlags};
use crate::Result;

/// Scheme every returned endpoint carries
pub const ENDPOINT_SCHEME: &str = "https://";

/// How to reach a cluster once its driver has provisioned it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterCredentials {
    /// API server URL, always `https://`-prefixed
    pub endpoint: String,
    /// Service account token for the API server
    pub service_account_token: String,
    /// CA certificate of the API server
    pub root_ca_cert: String,
}

impl From<ClusterInfo> for ClusterCredentials {
    fn from(info: ClusterInfo) -> Self {
        Self {
            endpoint: normalize_endpoint(&info.endpoint),
            service_account_token: info.service_account_token,
            root_ca_cert: info.root_ca_certificate,
        }
    }
}

/// Prefix `endpoint` with `https://` unless it already carries it
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with(ENDPOINT_SCHEME) {
        endpoint.to_string()
    } else {
        format!("{ENDPOINT_SCHEME}{endpoint}")
    }
}

/// Entry point for cluster lifecycle calls
#[derive(Clone)]
pub struct ClusterFacade {
    registry: SharedPluginRegistry,
    store: Arc<dyn ClusterStore>,
}

/// A call that passed resolution and is ready to go on the wire
struct Resolved {
    driver: String,
    address: String,
    options: OptionBag,
}

impl ClusterFacade {
    /// Create a facade over the given registry and cluster store
    pub fn new(registry: SharedPluginRegistry, store: Arc<dyn ClusterStore>) -> Self {
        Self { registry, store }
    }

    fn resolve(&self, name: &str, spec: &ClusterSpec) -> Result<Resolved> {
        let driver = spec.engine()?.driver_name().to_string();
        let options = driver_options(name, spec)?;
        let address = self.registry.resolve(&driver)?;
        debug!(cluster = %name, %driver, %address, "resolved driver");
        Ok(Resolved {
            driver,
            address,
            options,
        })
    }

    /// Stored info for `name`; an unknown cluster is handed to the driver empty
    async fn stored_info(&self, name: &str) -> Result<ClusterInfo> {
        match self.store.get(name).await? {
            Some(info) => Ok(info),
            None => {
                warn!(cluster = %name, "no stored cluster info, sending an empty one to the driver");
                Ok(ClusterInfo::default())
            }
        }
    }

    async fn connect(&self, ctx: &CallContext, resolved: &Resolved) -> Result<DriverClient> {
        DriverClient::connect(ctx, &resolved.address).await
    }

    /// Provision a cluster and return its credentials
    #[instrument(skip_all, fields(cluster = %name))]
    pub async fn create(
        &self,
        ctx: &CallContext,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<ClusterCredentials> {
        let resolved = self.resolve(name, spec)?;
        let mut client = self.connect(ctx, &resolved).await?;

        info!(driver = %resolved.driver, "creating cluster");
        let info = client
            .create(ctx, resolved.options, ClusterInfo::default())
            .await?;
        let info = client.post_check(ctx, info).await?;
        self.store.store(name, info.clone()).await?;

        Ok(info.into())
    }

    /// Apply `spec` to an existing cluster and return its credentials
    #[instrument(skip_all, fields(cluster = %name))]
    pub async fn update(
        &self,
        ctx: &CallContext,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<ClusterCredentials> {
        let resolved = self.resolve(name, spec)?;
        let stored = self.stored_info(name).await?;
        let mut client = self.connect(ctx, &resolved).await?;

        info!(driver = %resolved.driver, "updating cluster");
        let info = client.update(ctx, stored, resolved.options).await?;
        let info = client.post_check(ctx, info).await?;
        self.store.store(name, info.clone()).await?;

        Ok(info.into())
    }

    /// Tear a cluster down and forget its stored info
    #[instrument(skip_all, fields(cluster = %name))]
    pub async fn remove(&self, ctx: &CallContext, name: &str, spec: &ClusterSpec) -> Result<()> {
        let resolved = self.resolve(name, spec)?;
        let stored = self.stored_info(name).await?;
        let mut client = self.connect(ctx, &resolved).await?;

        info!(driver = %resolved.driver, "removing cluster");
        client.remove(ctx, stored).await?;
        self.store.remove(name).await
    }

    /// Flags the spec's driver accepts on create
    pub async fn get_driver_create_options(
        &self,
        ctx: &CallContext,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<DriverFlags> {
        let resolved = self.resolve(name, spec)?;
        let mut client = self.connect(ctx, &resolved).await?;
        client.get_driver_create_options(ctx).await
    }

    /// Flags the spec's driver accepts on update
    pub async fn get_driver_update_options(
        &self,
        ctx: &CallContext,
        name: &str,
        spec: &ClusterSpec,
    ) -> Result<DriverFlags> {
        let resolved = self.resolve(name, spec)?;
        let mut client = self.connect(ctx, &resolved).await?;
        client.get_driver_update_options(ctx).await
    }
}
