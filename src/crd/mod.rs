//! Custom Resource Definitions for the driver bridge

mod driver;
mod types;

pub use driver::{KontainerDriver, KontainerDriverSpec, KontainerDriverStatus};
pub use types::{
    set_condition, Condition, ConditionStatus, LifecycleState, CONDITION_ACTIVE,
    CONDITION_DOWNLOADED, CONDITION_INACTIVE, CONDITION_INSTALLED,
};
