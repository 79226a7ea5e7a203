//! Cluster lifecycle calls routed to registered drivers
//!
//! - [`spec`]: the input document and its engine discriminator
//! - [`flatten`]: translation of the document into an [`crate::options::OptionBag`]
//! - [`store`]: persistence of the cluster info drivers return
//! - [`facade`]: the entry point tying the above to the plugin registry

pub mod facade;
pub mod flatten;
pub mod spec;
pub mod store;

pub use facade::{normalize_endpoint, ClusterCredentials, ClusterFacade};
pub use flatten::{driver_options, flatten};
pub use spec::{ClusterSpec, EngineConfig, ImportedConfig};
pub use store::{ClusterStore, MemoryClusterStore};
