//! Recording driver and failing storage for cluster tests.

use parking_lot::Mutex;

use super::capabilities::FanControlCapabilities;
use super::driver::{FanControlDriver, FanControlFunction, PatternTimer};
use super::logic::FanControlClusterLogic;
use super::state::PersistentAttributes;
use super::status::{ClusterResult, ClusterStatus};
use super::storage::FanControlStorage;
use super::types::{AttributeId, AttributePath, EndpointId, FanModeEnum};
use crate::error::{FanControlError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    Init,
    StateChange {
        endpoint_id: EndpointId,
        changes: FanControlFunction,
        fan_mode: FanModeEnum,
    },
    StartTimer {
        endpoint_id: EndpointId,
        seconds: u16,
        timer: PatternTimer,
    },
    CancelTimer {
        endpoint_id: EndpointId,
    },
}

pub struct RecordingDriver {
    capabilities: FanControlCapabilities,
    reject: Mutex<Option<ClusterStatus>>,
    events: Mutex<Vec<DriverEvent>>,
    dirty: Mutex<Vec<AttributePath>>,
    capability_queries: Mutex<usize>,
}

impl RecordingDriver {
    pub fn new(capabilities: FanControlCapabilities) -> Self {
        Self {
            capabilities,
            reject: Mutex::new(None),
            events: Mutex::new(Vec::new()),
            dirty: Mutex::new(Vec::new()),
            capability_queries: Mutex::new(0),
        }
    }

    /// Make every following state change fail with `status`.
    pub fn reject_with(&self, status: Option<ClusterStatus>) {
        *self.reject.lock() = status;
    }

    /// Everything except dirty marks, in call order.
    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().clone()
    }

    pub fn timer_events(&self) -> Vec<DriverEvent> {
        self.events()
            .into_iter()
            .filter(|e| {
                matches!(
                    e,
                    DriverEvent::StartTimer { .. } | DriverEvent::CancelTimer { .. }
                )
            })
            .collect()
    }

    pub fn last_timer(&self) -> Option<PatternTimer> {
        self.events().into_iter().rev().find_map(|e| match e {
            DriverEvent::StartTimer { timer, .. } => Some(timer),
            _ => None,
        })
    }

    pub fn dirty_attributes(&self) -> Vec<AttributeId> {
        self.dirty.lock().iter().map(|p| p.attribute_id).collect()
    }

    pub fn capability_queries(&self) -> usize {
        *self.capability_queries.lock()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
        self.dirty.lock().clear();
    }
}

impl FanControlDriver for RecordingDriver {
    fn init(&self) {
        self.events.lock().push(DriverEvent::Init);
    }

    fn capabilities(&self, _endpoint_id: EndpointId) -> FanControlCapabilities {
        *self.capability_queries.lock() += 1;
        self.capabilities
    }

    fn on_cluster_state_change(
        &self,
        endpoint_id: EndpointId,
        changes: FanControlFunction,
        cluster: &FanControlClusterLogic,
    ) -> ClusterResult {
        if let Some(status) = *self.reject.lock() {
            return Err(status);
        }
        self.events.lock().push(DriverEvent::StateChange {
            endpoint_id,
            changes,
            fan_mode: cluster.get_fan_mode_attribute(),
        });
        Ok(())
    }

    fn start_pattern_timer(&self, endpoint_id: EndpointId, num_seconds: u16, timer: PatternTimer) {
        self.events.lock().push(DriverEvent::StartTimer {
            endpoint_id,
            seconds: num_seconds,
            timer,
        });
    }

    fn cancel_pattern_timer(&self, endpoint_id: EndpointId) {
        self.events
            .lock()
            .push(DriverEvent::CancelTimer { endpoint_id });
    }

    fn mark_attribute_dirty(&self, path: &AttributePath) {
        self.dirty.lock().push(*path);
    }
}

/// Storage that loads nothing and fails every persist.
#[derive(Default)]
pub struct FailingStorage {
    attempts: Mutex<usize>,
}

impl FailingStorage {
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl FanControlStorage for FailingStorage {
    fn load(&self, _endpoint_id: EndpointId) -> Result<Option<PersistentAttributes>> {
        Ok(None)
    }

    fn persist(&self, _endpoint_id: EndpointId, _attributes: &PersistentAttributes) -> Result<()> {
        *self.attempts.lock() += 1;
        Err(FanControlError::IoError(std::io::Error::other("disk full")))
    }
}
