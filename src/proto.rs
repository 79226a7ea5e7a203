//! gRPC protocol definitions for the driver RPC surface
//!
//! This module contains the generated Protobuf and gRPC code for the
//! service every cluster driver process exposes.
//!
//! # Protocol Overview
//!
//! A driver is hosted as a standalone gRPC server bound to a loopback address.
//! The orchestrator resolves that address from the plugin registry and calls:
//!
//! - `GetDriverCreateOptions` / `GetDriverUpdateOptions` for flag metadata
//! - `Create` / `Update` / `PostCheck` / `Remove` for cluster lifecycle
//! - `GetCapabilities` and the optional version/size operations
//!
//! # Example
//!
//! ```ignore
//! use kontainer_bridge::proto::driver_client::DriverClient;
//!
//! let mut client = DriverClient::connect("http://127.0.0.1:40123").await?;
//! let flags = client.get_driver_create_options(Empty {}).await?.into_inner();
//! ```

#![allow(missing_docs)] // Generated code doesn't have docs

/// Generated protobuf and gRPC code for the driver service
pub mod driver {
    /// Version 1 of the driver protocol
    pub mod v1 {
        tonic::include_proto!("kontainer.driver.v1");
    }
}

// Re-export commonly used types at the module level for convenience
pub use driver::v1::*;
