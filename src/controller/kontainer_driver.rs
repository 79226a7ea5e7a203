//! KontainerDriver lifecycle: make described drivers reachable
//!
//! Built-in drivers are hosted in-process and registered at startup, so
//! activating one only records conditions. External drivers are downloaded,
//! verified, started on their port and registered by address. Removing a
//! descriptor deregisters the address and stops the process.
//!
//! Conditions are only rewritten when their status, reason or message
//! change, so a steady driver produces no writes and no new watch events.

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{info, instrument, warn};

use super::lifecycle::{Lifecycle, LifecycleError, LifecycleObject, LifecycleResult};
use crate::crd::{
    Condition, ConditionStatus, KontainerDriver, KontainerDriverStatus, LifecycleState,
    CONDITION_ACTIVE, CONDITION_DOWNLOADED, CONDITION_INACTIVE, CONDITION_INSTALLED,
};
use crate::install::DriverInstaller;
use crate::plugin::SharedPluginRegistry;

impl LifecycleObject for KontainerDriver {
    fn lifecycle_state(&self) -> LifecycleState {
        self.status
            .as_ref()
            .map(|s| s.lifecycle)
            .unwrap_or_default()
    }

    fn set_lifecycle_state(&mut self, state: LifecycleState) {
        self.status
            .get_or_insert_with(KontainerDriverStatus::default)
            .lifecycle = state;
    }
}

fn status_mut(driver: &mut KontainerDriver) -> &mut KontainerDriverStatus {
    driver
        .status
        .get_or_insert_with(KontainerDriverStatus::default)
}

fn set(
    driver: &mut KontainerDriver,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: impl Into<String>,
) {
    let message = message.into();
    let current = status_mut(driver);
    let unchanged = current.get_condition(type_).is_some_and(|c| {
        c.status == status && c.reason == reason && c.message == message
    });
    if !unchanged {
        current.set_condition(Condition::new(type_, status, reason, message));
    }
}

/// Activates and deactivates drivers described by KontainerDriver objects
pub struct KontainerDriverLifecycle {
    registry: SharedPluginRegistry,
    installer: Arc<dyn DriverInstaller>,
}

impl KontainerDriverLifecycle {
    /// Create a lifecycle registering drivers in `registry`
    pub fn new(registry: SharedPluginRegistry, installer: Arc<dyn DriverInstaller>) -> Self {
        Self {
            registry,
            installer,
        }
    }

    #[instrument(skip_all, fields(driver = %driver.name_any()))]
    async fn activate(&self, mut driver: KontainerDriver) -> LifecycleResult<KontainerDriver> {
        let name = driver.name_any();

        if driver.spec.built_in {
            if self.registry.is_registered(&name) {
                set(&mut driver, CONDITION_DOWNLOADED, ConditionStatus::True, "BuiltIn", "");
                set(&mut driver, CONDITION_INSTALLED, ConditionStatus::True, "BuiltIn", "");
                set(&mut driver, CONDITION_ACTIVE, ConditionStatus::True, "BuiltIn", "");
                set(&mut driver, CONDITION_INACTIVE, ConditionStatus::False, "BuiltIn", "");
            } else {
                warn!("built-in driver is not hosted by this process");
                set(
                    &mut driver,
                    CONDITION_ACTIVE,
                    ConditionStatus::False,
                    "NotHosted",
                    "built-in driver is not hosted by this process",
                );
            }
            return Ok(driver);
        }

        if !driver.spec.needs_install() && self.registry.is_registered(&name) {
            return Ok(driver);
        }

        let url = driver.spec.desired_url.clone();
        let binary = match self
            .installer
            .download(&name, &url, &driver.spec.checksum)
            .await
        {
            Ok(binary) => binary,
            Err(e) => {
                set(&mut driver, CONDITION_DOWNLOADED, ConditionStatus::False, "DownloadFailed", e.to_string());
                return Err(LifecycleError::with_object(driver, e));
            }
        };
        set(&mut driver, CONDITION_DOWNLOADED, ConditionStatus::True, "Downloaded", "");

        let address = match self
            .installer
            .start(&name, &binary, driver.spec.desired_port)
            .await
        {
            Ok(address) => address,
            Err(e) => {
                set(&mut driver, CONDITION_INSTALLED, ConditionStatus::False, "StartFailed", e.to_string());
                return Err(LifecycleError::with_object(driver, e));
            }
        };
        set(&mut driver, CONDITION_INSTALLED, ConditionStatus::True, "Installed", "");

        self.registry.register_external(name.clone(), address.to_string());
        driver.spec.actual_url = url;
        driver.spec.actual_port = address.port();
        set(&mut driver, CONDITION_ACTIVE, ConditionStatus::True, "Registered", address.to_string());
        set(&mut driver, CONDITION_INACTIVE, ConditionStatus::False, "Registered", "");

        info!(%address, "driver activated");
        Ok(driver)
    }

    #[instrument(skip_all, fields(driver = %driver.name_any()))]
    async fn deactivate(&self, mut driver: KontainerDriver) -> LifecycleResult<KontainerDriver> {
        let name = driver.name_any();

        if !driver.spec.built_in {
            self.registry.deregister_external(&name);
            self.installer.stop(&name).await?;
        }

        set(&mut driver, CONDITION_ACTIVE, ConditionStatus::False, "Removed", "");
        set(&mut driver, CONDITION_INACTIVE, ConditionStatus::True, "Removed", "");
        info!("driver deactivated");
        Ok(driver)
    }
}

#[async_trait]
impl Lifecycle<KontainerDriver> for KontainerDriverLifecycle {
    async fn create(&self, obj: KontainerDriver) -> LifecycleResult<KontainerDriver> {
        self.activate(obj).await
    }

    async fn updated(&self, obj: KontainerDriver) -> LifecycleResult<KontainerDriver> {
        self.activate(obj).await
    }

    async fn remove(&self, obj: KontainerDriver) -> LifecycleResult<KontainerDriver> {
        self.deactivate(obj).await
    }
}
