//! Endpoint registry and request routing for the Fan Control cluster.
//!
//! Maps raw attribute and command ids to the typed logic API and turns
//! routing failures (unknown endpoint, attribute or command, read-only
//! attribute) into interaction statuses.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use super::driver::{FanControlDriver, PatternTimer};
use super::logic::FanControlClusterLogic;
use super::status::{ClusterResult, ClusterStatus};
use super::step::StepRequest;
use super::storage::FanControlStorage;
use super::types::{
    AirflowDirectionEnum, AttributeId, CommandId, EndpointId, FanModeEnum, FanModeSequenceEnum,
    Percent, RockBitmap, WindBitmap,
};
use crate::config::ClusterConfig;
use crate::error::{FanControlError, Result};

/// Typed value of one Fan Control attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    FanMode(FanModeEnum),
    FanModeSequence(FanModeSequenceEnum),
    /// PercentSetting and PercentCurrent
    Percent(Percent),
    /// SpeedMax, SpeedSetting and SpeedCurrent
    Speed(u8),
    Rock(RockBitmap),
    Wind(WindBitmap),
    AirflowDirection(AirflowDirectionEnum),
}

impl AttributeValue {
    /// Decode a raw wire value for `attribute`.
    ///
    /// Enum values outside their range and bitmaps with undefined bits are
    /// constraint errors.
    pub fn from_raw(attribute: AttributeId, raw: u8) -> ClusterResult<Self> {
        let value = match attribute {
            AttributeId::FanMode => {
                Self::FanMode(FanModeEnum::from_repr(raw).ok_or(ClusterStatus::ConstraintError)?)
            }
            AttributeId::FanModeSequence => Self::FanModeSequence(
                FanModeSequenceEnum::from_repr(raw).ok_or(ClusterStatus::ConstraintError)?,
            ),
            AttributeId::PercentSetting | AttributeId::PercentCurrent => Self::Percent(raw),
            AttributeId::SpeedMax | AttributeId::SpeedSetting | AttributeId::SpeedCurrent => {
                Self::Speed(raw)
            }
            AttributeId::RockSupport | AttributeId::RockSetting => {
                Self::Rock(RockBitmap::from_bits(raw).ok_or(ClusterStatus::ConstraintError)?)
            }
            AttributeId::WindSupport | AttributeId::WindSetting => {
                Self::Wind(WindBitmap::from_bits(raw).ok_or(ClusterStatus::ConstraintError)?)
            }
            AttributeId::AirflowDirection => Self::AirflowDirection(
                AirflowDirectionEnum::from_repr(raw).ok_or(ClusterStatus::ConstraintError)?,
            ),
        };
        Ok(value)
    }

    /// Raw wire value.
    pub fn to_raw(self) -> u8 {
        match self {
            Self::FanMode(mode) => mode as u8,
            Self::FanModeSequence(sequence) => sequence as u8,
            Self::Percent(percent) => percent,
            Self::Speed(speed) => speed,
            Self::Rock(rock) => rock.bits(),
            Self::Wind(wind) => wind.bits(),
            Self::AirflowDirection(direction) => direction as u8,
        }
    }
}

/// Fan Control server hosting any number of endpoints.
///
/// Every endpoint gets its own [`FanControlClusterLogic`] behind a lock so a
/// dispatcher and the driver's timer loop can share it.
pub struct FanControlServer {
    config: ClusterConfig,
    storage: Arc<dyn FanControlStorage>,
    endpoints: RwLock<HashMap<EndpointId, Arc<RwLock<FanControlClusterLogic>>>>,
}

impl FanControlServer {
    pub fn new(config: ClusterConfig, storage: Arc<dyn FanControlStorage>) -> Self {
        Self {
            config,
            storage,
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Create and initialize the cluster on `endpoint_id`.
    pub fn register_endpoint(
        &self,
        endpoint_id: EndpointId,
        driver: Arc<dyn FanControlDriver>,
    ) -> Result<Arc<RwLock<FanControlClusterLogic>>> {
        let mut endpoints = self.endpoints.write();
        if endpoints.contains_key(&endpoint_id) {
            return Err(FanControlError::EndpointAlreadyRegistered(endpoint_id));
        }

        let mut logic = FanControlClusterLogic::new(self.config);
        logic.init(endpoint_id, self.storage.clone(), driver)?;

        let logic = Arc::new(RwLock::new(logic));
        endpoints.insert(endpoint_id, logic.clone());
        info!("Registered FanControl endpoint {}", endpoint_id);
        Ok(logic)
    }

    /// Deinitialize and drop the cluster on `endpoint_id`.
    pub fn unregister_endpoint(&self, endpoint_id: EndpointId) -> Result<()> {
        let logic = self
            .endpoints
            .write()
            .remove(&endpoint_id)
            .ok_or(FanControlError::EndpointNotFound(endpoint_id))?;
        logic.write().deinit();
        info!("Unregistered FanControl endpoint {}", endpoint_id);
        Ok(())
    }

    pub fn find_endpoint(
        &self,
        endpoint_id: EndpointId,
    ) -> Option<Arc<RwLock<FanControlClusterLogic>>> {
        self.endpoints.read().get(&endpoint_id).cloned()
    }

    /// Registered endpoint ids in ascending order.
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        let mut ids: Vec<_> = self.endpoints.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn read(&self, endpoint_id: EndpointId, attribute_id: u32) -> ClusterResult<AttributeValue> {
        let logic = self.endpoint(endpoint_id)?;
        let attribute =
            AttributeId::from_repr(attribute_id).ok_or(ClusterStatus::UnsupportedAttribute)?;
        logic.read().read_attribute(attribute)
    }

    pub fn write(
        &self,
        endpoint_id: EndpointId,
        attribute_id: u32,
        value: AttributeValue,
    ) -> ClusterResult {
        let logic = self.endpoint(endpoint_id)?;
        let attribute =
            AttributeId::from_repr(attribute_id).ok_or(ClusterStatus::UnsupportedAttribute)?;
        let result = logic.write().write_attribute(attribute, value);
        if let Err(status) = &result {
            debug!(
                "Write of {:?} on endpoint {} failed: {}",
                attribute, endpoint_id, status
            );
        }
        result
    }

    /// Write a raw wire value, decoding it for the target attribute first.
    pub fn write_raw(&self, endpoint_id: EndpointId, attribute_id: u32, raw: u8) -> ClusterResult {
        let logic = self.endpoint(endpoint_id)?;
        let attribute =
            AttributeId::from_repr(attribute_id).ok_or(ClusterStatus::UnsupportedAttribute)?;
        let mut logic = logic.write();
        if !logic.is_attribute_supported(attribute) {
            return Err(ClusterStatus::UnsupportedAttribute);
        }
        if !attribute.is_writable() {
            return Err(ClusterStatus::UnsupportedWrite);
        }
        let value = AttributeValue::from_raw(attribute, raw)?;
        logic.write_attribute(attribute, value)
    }

    pub fn invoke(
        &self,
        endpoint_id: EndpointId,
        command_id: u32,
        request: &StepRequest,
    ) -> ClusterResult {
        let logic = self.endpoint(endpoint_id)?;
        match CommandId::from_repr(command_id) {
            Some(CommandId::Step) => logic.write().handle_step_request(request),
            None => Err(ClusterStatus::UnsupportedCommand),
        }
    }

    /// Route an expired pattern timer back to its endpoint.
    pub fn handle_pattern_timer(&self, timer: PatternTimer) -> ClusterResult {
        match self.find_endpoint(timer.endpoint_id) {
            Some(logic) => logic.write().handle_pattern_timer(timer),
            None => {
                debug!(
                    "Pattern timer for unregistered endpoint {}",
                    timer.endpoint_id
                );
                Ok(())
            }
        }
    }

    fn endpoint(&self, endpoint_id: EndpointId) -> ClusterResult<Arc<RwLock<FanControlClusterLogic>>> {
        self.find_endpoint(endpoint_id)
            .ok_or(ClusterStatus::UnsupportedEndpoint)
    }
}
