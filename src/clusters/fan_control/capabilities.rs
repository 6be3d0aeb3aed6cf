//! Driver-reported capabilities of one fan endpoint.

use serde::{Deserialize, Serialize};

use super::types::{AttributeId, Feature, FanModeSequenceEnum, RockBitmap, WindBitmap};
use crate::error::{FanControlError, Result};

/// Upper bound of SpeedMax allowed by the cluster.
pub const SPEED_MAX_LIMIT: u8 = 100;

/// Device features, limits, and attributes with fixed quality.
///
/// Obtained once from the driver at initialization and never changed afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanControlCapabilities {
    pub supported_features: Feature,

    // Mandatory
    pub fan_mode_sequence: FanModeSequenceEnum,

    /// Only valid if `supported_features` has `MULTI_SPEED`
    pub speed_max: u8,

    /// Only valid if `supported_features` has `ROCKING`
    pub rock_support: RockBitmap,

    /// Only valid if `supported_features` has `WIND`
    pub wind_support: WindBitmap,
}

impl FanControlCapabilities {
    pub fn new(supported_features: Feature, fan_mode_sequence: FanModeSequenceEnum) -> Self {
        Self {
            supported_features,
            fan_mode_sequence,
            ..Self::default()
        }
    }

    pub fn with_speed_max(mut self, speed_max: u8) -> Self {
        self.speed_max = speed_max;
        self
    }

    pub fn with_rock_support(mut self, rock_support: RockBitmap) -> Self {
        self.rock_support = rock_support;
        self
    }

    pub fn with_wind_support(mut self, wind_support: WindBitmap) -> Self {
        self.wind_support = wind_support;
        self
    }

    pub fn has(&self, feature: Feature) -> bool {
        self.supported_features.contains(feature)
    }

    /// SpeedMax as exposed to clients; 0 without multi-speed.
    pub fn effective_speed_max(&self) -> u8 {
        if self.has(Feature::MULTI_SPEED) {
            self.speed_max
        } else {
            0
        }
    }

    pub fn effective_rock_support(&self) -> RockBitmap {
        if self.has(Feature::ROCKING) {
            self.rock_support
        } else {
            RockBitmap::empty()
        }
    }

    pub fn effective_wind_support(&self) -> WindBitmap {
        if self.has(Feature::WIND) {
            self.wind_support
        } else {
            WindBitmap::empty()
        }
    }

    /// Check the limits a driver reported against the cluster constraints.
    pub fn validate(&self) -> Result<()> {
        if self.has(Feature::MULTI_SPEED) && !(1..=SPEED_MAX_LIMIT).contains(&self.speed_max) {
            return Err(FanControlError::InvalidCapabilities(format!(
                "speed_max {} outside 1..={}",
                self.speed_max, SPEED_MAX_LIMIT
            )));
        }
        if self.has(Feature::ROCKING) && self.rock_support.is_empty() {
            return Err(FanControlError::InvalidCapabilities(
                "rocking feature without any supported rock motion".to_string(),
            ));
        }
        if self.has(Feature::WIND) && self.wind_support.is_empty() {
            return Err(FanControlError::InvalidCapabilities(
                "wind feature without any supported wind mode".to_string(),
            ));
        }
        if self.fan_mode_sequence.supports_auto() && !self.has(Feature::AUTO) {
            return Err(FanControlError::InvalidCapabilities(format!(
                "mode sequence {:?} requires the auto feature",
                self.fan_mode_sequence
            )));
        }
        Ok(())
    }
}

/// Whether `attribute` exists on an endpoint with these capabilities.
///
/// Shared by the read and the write path so both gate on the same rule.
pub fn is_attribute_supported(caps: &FanControlCapabilities, attribute: AttributeId) -> bool {
    match attribute {
        AttributeId::FanMode
        | AttributeId::FanModeSequence
        | AttributeId::PercentSetting
        | AttributeId::PercentCurrent => true,
        AttributeId::SpeedMax | AttributeId::SpeedSetting | AttributeId::SpeedCurrent => {
            caps.has(Feature::MULTI_SPEED)
        }
        AttributeId::RockSupport | AttributeId::RockSetting => caps.has(Feature::ROCKING),
        AttributeId::WindSupport | AttributeId::WindSetting => caps.has(Feature::WIND),
        AttributeId::AirflowDirection => caps.has(Feature::AIRFLOW_DIRECTION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_gating() {
        let caps = FanControlCapabilities::new(Feature::STEP, FanModeSequenceEnum::OffLowHigh);
        assert!(is_attribute_supported(&caps, AttributeId::FanMode));
        assert!(is_attribute_supported(&caps, AttributeId::PercentCurrent));
        assert!(!is_attribute_supported(&caps, AttributeId::SpeedSetting));
        assert!(!is_attribute_supported(&caps, AttributeId::RockSetting));
        assert!(!is_attribute_supported(&caps, AttributeId::WindSupport));
        assert!(!is_attribute_supported(&caps, AttributeId::AirflowDirection));

        let caps = FanControlCapabilities::new(
            Feature::MULTI_SPEED | Feature::ROCKING | Feature::AIRFLOW_DIRECTION,
            FanModeSequenceEnum::OffLowHigh,
        );
        assert!(is_attribute_supported(&caps, AttributeId::SpeedMax));
        assert!(is_attribute_supported(&caps, AttributeId::RockSupport));
        assert!(is_attribute_supported(&caps, AttributeId::AirflowDirection));
    }

    #[test]
    fn test_effective_values_hide_unsupported_features() {
        let caps = FanControlCapabilities::new(Feature::empty(), FanModeSequenceEnum::OffHigh)
            .with_speed_max(10)
            .with_rock_support(RockBitmap::ROUND);
        assert_eq!(caps.effective_speed_max(), 0);
        assert_eq!(caps.effective_rock_support(), RockBitmap::empty());
    }

    #[test]
    fn test_validate() {
        let ok = FanControlCapabilities::new(Feature::MULTI_SPEED, FanModeSequenceEnum::OffLowHigh)
            .with_speed_max(10);
        assert!(ok.validate().is_ok());

        let zero = FanControlCapabilities::new(Feature::MULTI_SPEED, FanModeSequenceEnum::OffLowHigh);
        assert!(zero.validate().is_err());

        let too_big = zero.with_speed_max(101);
        assert!(too_big.validate().is_err());

        let rock = FanControlCapabilities::new(Feature::ROCKING, FanModeSequenceEnum::OffHigh);
        assert!(rock.validate().is_err());

        let auto = FanControlCapabilities::new(Feature::empty(), FanModeSequenceEnum::OffHighAuto);
        assert!(auto.validate().is_err());
    }
}
