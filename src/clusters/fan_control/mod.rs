//! Fan Control cluster (0x0202) server logic.
//!
//! Protocol-independent: attribute access and commands arrive through
//! [`FanControlServer`] or directly on [`FanControlClusterLogic`], hardware
//! effects leave through [`FanControlDriver`].

mod capabilities;
mod driver;
mod logic;
mod server;
mod state;
mod status;
mod step;
mod storage;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use capabilities::{FanControlCapabilities, SPEED_MAX_LIMIT, is_attribute_supported};
pub use driver::{FanControlDriver, FanControlFunction, PatternTimer};
pub use logic::FanControlClusterLogic;
pub use server::{AttributeValue, FanControlServer};
pub use state::{
    FanControlClusterState, PERCENT_MAX, PersistentAttributes, VolatileAttributes,
    mode_to_percent, percent_to_mode, percent_to_speed, speed_to_percent,
};
pub use status::{ClusterResult, ClusterStatus, FanControlStatusCode, ImStatus};
pub use step::{StepBounds, StepRequest, step_value};
pub use storage::{FanControlStorage, JsonFileStorage, MemoryStorage, PersistedEndpoints};
pub use types::{
    AirflowDirectionEnum, AttributeId, AttributePath, CommandId, EndpointId, FanModeEnum,
    FanModeSequenceEnum, Feature, Percent, RockBitmap, RotateEnum, StepDirectionEnum, WindBitmap,
};

/// Fan Control cluster identifier
pub const CLUSTER_ID: u32 = 0x0202;

/// Cluster revision implemented here
pub const CLUSTER_REVISION: u16 = 4;
