//! Plugin registry: where drivers become reachable
//!
//! The registry maps a driver name to the loopback address its RPC service
//! listens on. Drivers hosted in this process are started through
//! [`server::spawn_driver_server`]; drivers running elsewhere are recorded with
//! [`PluginRegistry::register_external`].
//!
//! Both tables sit behind one lock. Registration only writes them after the
//! bound address has been handed back, so a name never resolves before its
//! `register` call returns.

pub mod client;
pub mod server;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::driver::Driver;
use crate::{Error, Result};

/// Registry shared by the facade, the controller and the binary
pub type SharedPluginRegistry = Arc<PluginRegistry>;

#[derive(Default)]
struct Tables {
    addresses: HashMap<String, String>,
    drivers: HashMap<String, Arc<dyn Driver>>,
}

/// Name to address table for reachable drivers
#[derive(Default)]
pub struct PluginRegistry {
    tables: Mutex<Tables>,
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Host `driver` on `port` (0 = ephemeral) and record it under `name`
    ///
    /// Returns once the service is bound, with the concrete `host:port`.
    /// Re-registering a name overwrites the previous entry; the previously
    /// started service keeps running.
    pub async fn register(
        &self,
        name: impl Into<String>,
        driver: Arc<dyn Driver>,
        port: u16,
    ) -> Result<String> {
        let name = name.into();
        info!(driver = %name, port, "activating driver");

        let bound = server::spawn_driver_server(driver.clone(), port)
            .await
            .map_err(|_| Error::transport(format!("driver {name} server exited before binding")))??;
        let address = bound.to_string();

        {
            let mut tables = self.tables.lock();
            tables.drivers.insert(name.clone(), driver);
            tables.addresses.insert(name.clone(), address.clone());
        }

        info!(driver = %name, %address, "activating driver done");
        Ok(address)
    }

    /// Register every in-process driver on an ephemeral port
    ///
    /// Stops at the first failure; drivers registered before it stay registered.
    pub async fn register_all<I, S>(&self, drivers: I) -> Result<Vec<(String, String)>>
    where
        I: IntoIterator<Item = (S, Arc<dyn Driver>)>,
        S: Into<String>,
    {
        let mut registered = Vec::new();
        for (name, driver) in drivers {
            let name = name.into();
            let address = self.register(name.clone(), driver, 0).await?;
            registered.push((name, address));
        }
        Ok(registered)
    }

    /// Record the address of a driver that is already running elsewhere
    pub fn register_external(&self, name: impl Into<String>, address: impl Into<String>) {
        let name = name.into();
        let address = address.into();
        debug!(driver = %name, %address, "registering external driver");
        self.tables.lock().addresses.insert(name, address);
    }

    /// Forget the address of a driver; any local service keeps running
    pub fn deregister_external(&self, name: &str) -> Option<String> {
        debug!(driver = %name, "deregistering driver");
        self.tables.lock().addresses.remove(name)
    }

    /// Current address for `name`
    pub fn resolve(&self, name: &str) -> Result<String> {
        self.tables
            .lock()
            .addresses
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriverNotFound(name.to_string()))
    }

    /// In-process implementation registered under `name`, if any
    pub fn driver(&self, name: &str) -> Option<Arc<dyn Driver>> {
        self.tables.lock().drivers.get(name).cloned()
    }

    /// Returns true if `name` currently resolves to an address
    pub fn is_registered(&self, name: &str) -> bool {
        self.tables.lock().addresses.contains_key(name)
    }

    /// Sorted names of all resolvable drivers
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.lock().addresses.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::ExampleDriver;

    #[tokio::test]
    async fn test_ephemeral_registrations_get_distinct_addresses() {
        let registry = PluginRegistry::new();

        let first = registry
            .register("first", Arc::new(ExampleDriver), 0)
            .await
            .unwrap();
        assert_eq!(registry.resolve("first").unwrap(), first);

        let second = registry
            .register("second", Arc::new(ExampleDriver), 0)
            .await
            .unwrap();
        assert_eq!(registry.resolve("second").unwrap(), second);

        assert_ne!(first, second);
        assert!(first.starts_with("127.0.0.1:"));
        assert!(registry.driver("first").is_some());
    }

    #[tokio::test]
    async fn test_reregistration_overwrites_address() {
        let registry = PluginRegistry::new();
        let old = registry
            .register("mydriver", Arc::new(ExampleDriver), 0)
            .await
            .unwrap();
        let new = registry
            .register("mydriver", Arc::new(ExampleDriver), 0)
            .await
            .unwrap();

        assert_ne!(old, new);
        assert_eq!(registry.resolve("mydriver").unwrap(), new);
        assert_eq!(registry.names(), vec!["mydriver".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_bind_records_nothing() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let registry = PluginRegistry::new();
        let err = registry
            .register("mydriver", Arc::new(ExampleDriver), port)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Bind { .. }));
        assert!(!registry.is_registered("mydriver"));
        assert!(registry.driver("mydriver").is_none());
    }

    #[tokio::test]
    async fn test_register_all_uses_ephemeral_ports() {
        let registry = PluginRegistry::new();
        let drivers: Vec<(&str, Arc<dyn Driver>)> = vec![
            ("alpha", Arc::new(ExampleDriver)),
            ("beta", Arc::new(ExampleDriver)),
        ];

        let registered = registry.register_all(drivers).await.unwrap();

        assert_eq!(registered.len(), 2);
        assert_eq!(registry.names(), vec!["alpha".to_string(), "beta".to_string()]);
        for (name, address) in registered {
            assert_eq!(registry.resolve(&name).unwrap(), address);
        }
    }

    #[test]
    fn test_external_register_resolve_deregister() {
        let registry = PluginRegistry::new();
        registry.register_external("remote", "10.0.0.5:9000");

        assert_eq!(registry.resolve("remote").unwrap(), "10.0.0.5:9000");
        assert!(registry.driver("remote").is_none());

        assert_eq!(
            registry.deregister_external("remote"),
            Some("10.0.0.5:9000".to_string())
        );
        match registry.resolve("remote") {
            Err(Error::DriverNotFound(name)) => assert_eq!(name, "remote"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn test_deregister_unknown_name_is_a_noop() {
        let registry = PluginRegistry::new();
        assert_eq!(registry.deregister_external("ghost"), None);
    }
}
