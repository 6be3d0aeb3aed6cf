//! Interface the hardware driver implements for the cluster logic.
//!
//! The logic never owns the physical fan. Everything with a side effect
//! (motor changes, timers for rocking or wind patterns, subscription reports)
//! goes through [`FanControlDriver`], injected per endpoint at `init`.

use bitflags::bitflags;

use super::capabilities::FanControlCapabilities;
use super::logic::FanControlClusterLogic;
use super::status::ClusterResult;
use super::types::{AttributePath, EndpointId};

bitflags! {
    /// Which part of the cluster state changed.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct FanControlFunction: u8 {
        /// FanMode changed (including the implicit run/off transitions)
        const MODE = 0x01;
        /// PercentSetting or SpeedSetting changed
        const SPEED = 0x02;
        /// RockSetting or WindSetting changed
        const PATTERN = 0x04;
        /// AirflowDirection changed
        const DIRECTION = 0x08;
        /// Recurring pattern timer fired
        const PATTERN_TICK = 0x10;
    }
}

/// Token handed to the driver when a pattern timer is started.
///
/// The driver hands it back to [`FanControlClusterLogic::handle_pattern_timer`]
/// when the timer expires, on the same serialized context as every other call.
/// Tokens of cancelled timers are recognised and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternTimer {
    pub endpoint_id: EndpointId,
    pub(crate) generation: u32,
}

pub trait FanControlDriver: Send + Sync {
    /// Called once before the capabilities are queried.
    fn init(&self) {}

    fn capabilities(&self, endpoint_id: EndpointId) -> FanControlCapabilities;

    /// A committed change is about to become visible.
    ///
    /// `cluster` already holds the new values. Returning an error rolls the
    /// change back and the error is reported to the requester.
    fn on_cluster_state_change(
        &self,
        endpoint_id: EndpointId,
        changes: FanControlFunction,
        cluster: &FanControlClusterLogic,
    ) -> ClusterResult;

    fn start_pattern_timer(&self, endpoint_id: EndpointId, num_seconds: u16, timer: PatternTimer);

    fn cancel_pattern_timer(&self, endpoint_id: EndpointId);

    fn mark_attribute_dirty(&self, path: &AttributePath);
}
