//! Cluster driver abstraction
//!
//! A driver implements cluster lifecycle operations for one kind of
//! infrastructure. Drivers are never called directly by the orchestrator:
//! they are hosted behind the RPC service in [`crate::plugin::server`] and
//! reached through the address recorded in the plugin registry.
//!
//! Every operation receives a [`CallContext`] carrying the caller's deadline
//! and cancellation token.
//!
//! # Example
//!
//! ```text
//! let registry = Arc::new(PluginRegistry::new());
//! let address = registry.register("mydriver", Arc::new(ExampleDriver), 0).await?;
//! ```

mod context;
pub mod example;

pub use context::CallContext;
pub use example::ExampleDriver;

use async_trait::async_trait;
use thiserror::Error;

use crate::options::OptionBag;
use crate::proto::{Capabilities, ClusterInfo, DriverFlags, KubernetesVersion, NodeCount};

/// Error returned by a driver implementation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver does not support the operation
    #[error("{0} is not implemented by this driver")]
    Unimplemented(String),

    /// The supplied options are unusable
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The operation was attempted and failed
    #[error("{0}")]
    Failed(String),
}

impl DriverError {
    /// Create an unimplemented error for the named operation
    pub fn unimplemented(operation: impl Into<String>) -> Self {
        Self::Unimplemented(operation.into())
    }

    /// Create an invalid options error with the given message
    pub fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }

    /// Create a failure with the given message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<DriverError> for tonic::Status {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Unimplemented(_) => tonic::Status::unimplemented(e.to_string()),
            DriverError::InvalidOptions(_) => tonic::Status::invalid_argument(e.to_string()),
            DriverError::Failed(_) => tonic::Status::internal(e.to_string()),
        }
    }
}

/// Cluster lifecycle operations implemented by a driver
///
/// The version and cluster-size operations are optional; the default
/// implementations report them as unimplemented.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Flags accepted when creating a cluster
    async fn get_driver_create_options(&self, ctx: &CallContext)
        -> Result<DriverFlags, DriverError>;

    /// Flags accepted when updating a cluster
    async fn get_driver_update_options(&self, ctx: &CallContext)
        -> Result<DriverFlags, DriverError>;

    /// Provision a cluster
    async fn create(
        &self,
        ctx: &CallContext,
        options: OptionBag,
        info: ClusterInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Apply new options to an existing cluster
    async fn update(
        &self,
        ctx: &CallContext,
        info: ClusterInfo,
        options: OptionBag,
    ) -> Result<ClusterInfo, DriverError>;

    /// Fill in connection details once a cluster is reachable
    async fn post_check(
        &self,
        ctx: &CallContext,
        info: ClusterInfo,
    ) -> Result<ClusterInfo, DriverError>;

    /// Tear a cluster down
    async fn remove(&self, ctx: &CallContext, info: ClusterInfo) -> Result<(), DriverError>;

    /// Optional capabilities advertised by the driver
    async fn get_capabilities(&self, ctx: &CallContext) -> Result<Capabilities, DriverError>;

    /// Kubernetes version running on the cluster
    async fn get_version(
        &self,
        _ctx: &CallContext,
        _info: ClusterInfo,
    ) -> Result<KubernetesVersion, DriverError> {
        Err(DriverError::unimplemented("GetVersion"))
    }

    /// Upgrade the cluster to the given version
    async fn set_version(
        &self,
        _ctx: &CallContext,
        _info: ClusterInfo,
        _version: KubernetesVersion,
    ) -> Result<(), DriverError> {
        Err(DriverError::unimplemented("SetVersion"))
    }

    /// Current node count
    async fn get_cluster_size(
        &self,
        _ctx: &CallContext,
        _info: ClusterInfo,
    ) -> Result<NodeCount, DriverError> {
        Err(DriverError::unimplemented("GetClusterSize"))
    }

    /// Resize the cluster
    async fn set_cluster_size(
        &self,
        _ctx: &CallContext,
        _info: ClusterInfo,
        _count: NodeCount,
    ) -> Result<(), DriverError> {
        Err(DriverError::unimplemented("SetClusterSize"))
    }
}
