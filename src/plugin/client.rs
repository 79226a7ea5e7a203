//! Typed client for a driver's RPC service
//!
//! Every call runs under the caller's [`CallContext`]: the remaining deadline
//! is forwarded as the gRPC timeout and cancellation aborts the in-flight
//! request. Failed calls are never retried here.

use std::time::Duration;

use tonic::transport::{Channel, Endpoint};
use tonic::Request;
use tracing::debug;

use crate::driver::CallContext;
use crate::options::OptionBag;
use crate::proto::driver_client::DriverClient as RpcClient;
use crate::proto::{
    Capabilities, ClusterInfo, CreateRequest, DriverFlags, Empty, KubernetesVersion, NodeCount,
    SetClusterSizeRequest, SetVersionRequest, UpdateRequest,
};
use crate::{Error, Result};

/// Upper bound on establishing the connection itself
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection to one driver
#[derive(Clone, Debug)]
pub struct DriverClient {
    inner: RpcClient<Channel>,
}

impl DriverClient {
    /// Connect to the driver listening on `address` (`host:port`)
    pub async fn connect(ctx: &CallContext, address: &str) -> Result<Self> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| Error::transport(format!("invalid driver address {address}: {e}")))?
            .connect_timeout(CONNECT_TIMEOUT);

        debug!(%address, "connecting to driver");
        let channel = ctx
            .run(async { endpoint.connect().await.map_err(Error::from) })
            .await?;

        Ok(Self {
            inner: RpcClient::new(channel),
        })
    }

    /// Flags accepted when creating a cluster
    pub async fn get_driver_create_options(&mut self, ctx: &CallContext) -> Result<DriverFlags> {
        let request = request(ctx, Empty {});
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.get_driver_create_options(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Flags accepted when updating a cluster
    pub async fn get_driver_update_options(&mut self, ctx: &CallContext) -> Result<DriverFlags> {
        let request = request(ctx, Empty {});
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.get_driver_update_options(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Provision a cluster
    pub async fn create(
        &mut self,
        ctx: &CallContext,
        options: OptionBag,
        info: ClusterInfo,
    ) -> Result<ClusterInfo> {
        let request = request(
            ctx,
            CreateRequest {
                driver_options: Some(options.into()),
                cluster_info: Some(info),
            },
        );
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.create(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Apply new options to an existing cluster
    pub async fn update(
        &mut self,
        ctx: &CallContext,
        info: ClusterInfo,
        options: OptionBag,
    ) -> Result<ClusterInfo> {
        let request = request(
            ctx,
            UpdateRequest {
                cluster_info: Some(info),
                driver_options: Some(options.into()),
            },
        );
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.update(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Fill in connection details once the cluster is reachable
    pub async fn post_check(&mut self, ctx: &CallContext, info: ClusterInfo) -> Result<ClusterInfo> {
        let request = request(ctx, info);
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.post_check(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Tear a cluster down
    pub async fn remove(&mut self, ctx: &CallContext, info: ClusterInfo) -> Result<()> {
        let request = request(ctx, info);
        let inner = &mut self.inner;
        ctx.run(async { inner.remove(request).await.map_err(Error::from) })
            .await?;
        Ok(())
    }

    /// Capabilities advertised by the driver
    pub async fn get_capabilities(&mut self, ctx: &CallContext) -> Result<Capabilities> {
        let request = request(ctx, Empty {});
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.get_capabilities(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Kubernetes version running on the cluster
    pub async fn get_version(
        &mut self,
        ctx: &CallContext,
        info: ClusterInfo,
    ) -> Result<KubernetesVersion> {
        let request = request(ctx, info);
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.get_version(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Upgrade the cluster to `version`
    pub async fn set_version(
        &mut self,
        ctx: &CallContext,
        info: ClusterInfo,
        version: KubernetesVersion,
    ) -> Result<()> {
        let request = request(
            ctx,
            SetVersionRequest {
                cluster_info: Some(info),
                version: Some(version),
            },
        );
        let inner = &mut self.inner;
        ctx.run(async { inner.set_version(request).await.map_err(Error::from) })
            .await?;
        Ok(())
    }

    /// Current node count
    pub async fn get_cluster_size(&mut self, ctx: &CallContext, info: ClusterInfo) -> Result<NodeCount> {
        let request = request(ctx, info);
        let inner = &mut self.inner;
        let response = ctx
            .run(async { inner.get_cluster_size(request).await.map_err(Error::from) })
            .await?;
        Ok(response.into_inner())
    }

    /// Resize the cluster to `count` nodes
    pub async fn set_cluster_size(
        &mut self,
        ctx: &CallContext,
        info: ClusterInfo,
        count: NodeCount,
    ) -> Result<()> {
        let request = request(
            ctx,
            SetClusterSizeRequest {
                cluster_info: Some(info),
                count: Some(count),
            },
        );
        let inner = &mut self.inner;
        ctx.run(async { inner.set_cluster_size(request).await.map_err(Error::from) })
            .await?;
        Ok(())
    }
}

/// Wrap `message`, forwarding what is left of the caller's deadline
fn request<T>(ctx: &CallContext, message: T) -> Request<T> {
    let mut request = Request::new(message);
    if let Some(remaining) = ctx.remaining() {
        request.set_timeout(remaining);
    }
    request
}
