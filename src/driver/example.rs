//! Reference driver hosted by the `kontainer-bridge` binary
//!
//! It provisions nothing: every call is logged and answered with the
//! smallest valid response. Useful for wiring tests and as a template for
//! real drivers.

use async_trait::async_trait;
use tracing::info;

use super::{CallContext, Driver, DriverError};
use crate::options::{flag, FlagType, OptionBag};
use crate::proto::{Capabilities, ClusterInfo, DriverFlags};

/// Name the example driver registers under
pub const EXAMPLE_DRIVER_NAME: &str = "mydriver";

/// Driver that logs calls and echoes cluster info back
#[derive(Clone, Copy, Debug, Default)]
pub struct ExampleDriver;

#[async_trait]
impl Driver for ExampleDriver {
    async fn get_driver_create_options(
        &self,
        _ctx: &CallContext,
    ) -> Result<DriverFlags, DriverError> {
        let mut flags = DriverFlags::default();
        flags.options.insert(
            "name".to_string(),
            flag(FlagType::String, "The internal name of the cluster"),
        );
        Ok(flags)
    }

    async fn get_driver_update_options(
        &self,
        _ctx: &CallContext,
    ) -> Result<DriverFlags, DriverError> {
        Ok(DriverFlags::default())
    }

    async fn create(
        &self,
        _ctx: &CallContext,
        options: OptionBag,
        info: ClusterInfo,
    ) -> Result<ClusterInfo, DriverError> {
        info!(?options, ?info, "example driver create called");
        Ok(ClusterInfo::default())
    }

    async fn update(
        &self,
        _ctx: &CallContext,
        info: ClusterInfo,
        options: OptionBag,
    ) -> Result<ClusterInfo, DriverError> {
        info!(?options, "example driver update called");
        Ok(info)
    }

    async fn post_check(
        &self,
        _ctx: &CallContext,
        info: ClusterInfo,
    ) -> Result<ClusterInfo, DriverError> {
        info!("example driver post check called");
        Ok(info)
    }

    async fn remove(&self, _ctx: &CallContext, _info: ClusterInfo) -> Result<(), DriverError> {
        info!("example driver remove called");
        Ok(())
    }

    async fn get_capabilities(&self, _ctx: &CallContext) -> Result<Capabilities, DriverError> {
        info!("example driver get capabilities called");
        Ok(Capabilities::default())
    }
}
