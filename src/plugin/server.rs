//! RPC bootstrap: host a [`Driver`] as a gRPC service
//!
//! [`spawn_driver_server`] binds a loopback listener inside a background task
//! and reports the concrete bound address back over a one-shot channel. The
//! sender is consumed by the single send, so the handoff happens exactly once:
//! either the bound address or the bind error.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

use crate::driver::{CallContext, Driver};
use crate::proto::driver_server::{Driver as DriverRpc, DriverServer};
use crate::proto::{
    Capabilities, ClusterInfo, CreateRequest, DriverFlags, Empty, KubernetesVersion, NodeCount,
    SetClusterSizeRequest, SetVersionRequest, UpdateRequest,
};
use crate::{Error, LISTEN_HOST};

/// Address a driver listens on for the given port (0 = ephemeral)
pub fn listen_address(port: u16) -> String {
    format!("{LISTEN_HOST}:{port}")
}

/// gRPC service wrapping a driver implementation
pub struct DriverService {
    driver: Arc<dyn Driver>,
}

impl DriverService {
    /// Wrap the given driver
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Convert to a tonic service
    pub fn into_service(self) -> DriverServer<Self> {
        DriverServer::new(self)
    }
}

// Each handler holds a drop guard on its call context, so a driver sees the
// call cancelled once tonic drops the handler (client gone or deadline passed).
#[tonic::async_trait]
impl DriverRpc for DriverService {
    async fn get_driver_create_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DriverFlags>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let flags = self.driver.get_driver_create_options(&ctx).await?;
        Ok(Response::new(flags))
    }

    async fn get_driver_update_options(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<DriverFlags>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let flags = self.driver.get_driver_update_options(&ctx).await?;
        Ok(Response::new(flags))
    }

    async fn create(
        &self,
        request: Request<CreateRequest>,
    ) -> Result<Response<ClusterInfo>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let req = request.into_inner();
        let info = self
            .driver
            .create(
                &ctx,
                req.driver_options.unwrap_or_default().into(),
                req.cluster_info.unwrap_or_default(),
            )
            .await?;
        Ok(Response::new(info))
    }

    async fn update(
        &self,
        request: Request<UpdateRequest>,
    ) -> Result<Response<ClusterInfo>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let req = request.into_inner();
        let info = self
            .driver
            .update(
                &ctx,
                req.cluster_info.unwrap_or_default(),
                req.driver_options.unwrap_or_default().into(),
            )
            .await?;
        Ok(Response::new(info))
    }

    async fn post_check(
        &self,
        request: Request<ClusterInfo>,
    ) -> Result<Response<ClusterInfo>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let info = self.driver.post_check(&ctx, request.into_inner()).await?;
        Ok(Response::new(info))
    }

    async fn remove(&self, request: Request<ClusterInfo>) -> Result<Response<Empty>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        self.driver.remove(&ctx, request.into_inner()).await?;
        Ok(Response::new(Empty {}))
    }

    async fn get_capabilities(
        &self,
        _request: Request<Empty>,
    ) -> Result<Response<Capabilities>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let caps = self.driver.get_capabilities(&ctx).await?;
        Ok(Response::new(caps))
    }

    async fn get_version(
        &self,
        request: Request<ClusterInfo>,
    ) -> Result<Response<KubernetesVersion>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let version = self.driver.get_version(&ctx, request.into_inner()).await?;
        Ok(Response::new(version))
    }

    async fn set_version(
        &self,
        request: Request<SetVersionRequest>,
    ) -> Result<Response<Empty>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let req = request.into_inner();
        self.driver
            .set_version(
                &ctx,
                req.cluster_info.unwrap_or_default(),
                req.version.unwrap_or_default(),
            )
            .await?;
        Ok(Response::new(Empty {}))
    }

    async fn get_cluster_size(
        &self,
        request: Request<ClusterInfo>,
    ) -> Result<Response<NodeCount>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let count = self
            .driver
            .get_cluster_size(&ctx, request.into_inner())
            .await?;
        Ok(Response::new(count))
    }

    async fn set_cluster_size(
        &self,
        request: Request<SetClusterSizeRequest>,
    ) -> Result<Response<Empty>, Status> {
        let ctx = CallContext::new();
        let _guard = ctx.drop_guard();
        let req = request.into_inner();
        self.driver
            .set_cluster_size(
                &ctx,
                req.cluster_info.unwrap_or_default(),
                req.count.unwrap_or_default(),
            )
            .await?;
        Ok(Response::new(Empty {}))
    }
}

/// One-shot receiver of the bound address (or the bind failure)
pub type BoundAddress = oneshot::Receiver<Result<SocketAddr, Error>>;

/// Start serving `driver` on the loopback address for `port` in a background task
///
/// The returned receiver yields exactly one value. The server keeps running
/// after the handoff; it is not restarted if it stops.
pub fn spawn_driver_server(driver: Arc<dyn Driver>, port: u16) -> BoundAddress {
    let (addr_tx, addr_rx) = oneshot::channel();
    tokio::spawn(serve(driver, listen_address(port), addr_tx));
    addr_rx
}

async fn serve(
    driver: Arc<dyn Driver>,
    address: String,
    addr_tx: oneshot::Sender<Result<SocketAddr, Error>>,
) {
    let (listener, bound) = match bind(&address).await {
        Ok(bound) => bound,
        Err(e) => {
            let _ = addr_tx.send(Err(e));
            return;
        }
    };

    if addr_tx.send(Ok(bound)).is_err() {
        warn!(%bound, "registrar went away before receiving the bound address");
    }

    info!(%bound, "driver RPC server listening");

    if let Err(e) = Server::builder()
        .add_service(DriverService::new(driver).into_service())
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
    {
        error!(%bound, error = %e, "driver RPC server stopped");
    }
}

async fn bind(address: &str) -> Result<(TcpListener, SocketAddr), Error> {
    let bind_error = |source| Error::Bind {
        address: address.to_string(),
        source,
    };
    let listener = TcpListener::bind(address).await.map_err(bind_error)?;
    let bound = listener.local_addr().map_err(bind_error)?;
    Ok((listener, bound))
}
