//! Kontainer Bridge - hosts cluster drivers behind an RPC boundary
//!
//! Cluster drivers (one per infrastructure provider) are served on loopback
//! ports and called through a uniform RPC contract. The bridge turns a
//! cluster specification into a flat option bag, resolves the driver that
//! handles it and runs the lifecycle operation against that driver.
//!
//! # Modules
//!
//! - [`options`] - Option bag exchanged with drivers
//! - [`cluster`] - Cluster specification, flattening and the cluster facade
//! - [`driver`] - The `Driver` trait, call contexts and the example driver
//! - [`plugin`] - Plugin registry, RPC server and client
//! - [`proto`] - gRPC protocol definitions for the driver contract
//! - [`crd`] - KontainerDriver custom resource
//! - [`controller`] - Generic controller, lifecycle adapter and driver reconciliation
//! - [`install`] - Download, verification and spawning of external driver binaries
//! - [`config`] - Controller and installer configuration
//! - [`retry`] - Exponential backoff shared by the queue and the installer
//! - [`error`] - Error types for the bridge

#![deny(missing_docs)]

pub mod cluster;
pub mod config;
pub mod controller;
pub mod crd;
pub mod driver;
pub mod error;
pub mod install;
pub mod options;
pub mod plugin;
pub mod proto;
pub mod retry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Host every driver service binds on
///
/// Drivers are only reachable from the local machine.
pub const LISTEN_HOST: &str = "127.0.0.1";
