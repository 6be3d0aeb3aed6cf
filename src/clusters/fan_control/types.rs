//! Enumerations, bitmaps and identifiers of the Fan Control cluster.
//!
//! Raw values match the Matter Fan Control cluster (0x0202) so a dispatcher can
//! convert wire values with `from_repr` and the `bits` accessors.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::FromRepr;

/// Matter endpoint identifier.
pub type EndpointId = u16;

/// Percentage value, 0 to 100.
pub type Percent = u8;

bitflags! {
    /// Cluster feature map.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Feature: u32 {
        /// 1-100 speeds (SPD)
        const MULTI_SPEED = 0x01;
        /// Automatic mode supported (AUT)
        const AUTO = 0x02;
        /// Rocking movement (RCK)
        const ROCKING = 0x04;
        /// Wind emulation (WND)
        const WIND = 0x08;
        /// Step command (STEP)
        const STEP = 0x10;
        /// Airflow direction change, i.e. reverse rotation (DIR)
        const AIRFLOW_DIRECTION = 0x20;
    }
}

bitflags! {
    /// Supported / selected rocking motions.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct RockBitmap: u8 {
        const LEFT_RIGHT = 0x01;
        const UP_DOWN = 0x02;
        const ROUND = 0x04;
    }
}

bitflags! {
    /// Supported / selected wind emulation modes.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WindBitmap: u8 {
        const SLEEP_WIND = 0x01;
        const NATURAL_WIND = 0x02;
    }
}

/// Operating mode of the fan.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromRepr, Serialize, Deserialize)]
#[repr(u8)]
pub enum FanModeEnum {
    #[default]
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    /// Deprecated alias, stored as `High`
    On = 4,
    Auto = 5,
    /// Stored as `Auto` when the sequence allows it, else `High`
    Smart = 6,
}

/// Mode progression supported by the device.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromRepr, Serialize, Deserialize)]
#[repr(u8)]
pub enum FanModeSequenceEnum {
    #[default]
    OffLowMedHigh = 0,
    OffLowHigh = 1,
    OffLowMedHighAuto = 2,
    OffLowHighAuto = 3,
    OffHighAuto = 4,
    OffHigh = 5,
}

impl FanModeSequenceEnum {
    /// Speed modes of the sequence in ascending order, excluding `Off` and `Auto`.
    pub fn speed_modes(self) -> &'static [FanModeEnum] {
        use FanModeEnum::{High, Low, Medium};
        match self {
            Self::OffLowMedHigh | Self::OffLowMedHighAuto => &[Low, Medium, High],
            Self::OffLowHigh | Self::OffLowHighAuto => &[Low, High],
            Self::OffHighAuto | Self::OffHigh => &[High],
        }
    }

    pub fn supports_auto(self) -> bool {
        matches!(
            self,
            Self::OffLowMedHighAuto | Self::OffLowHighAuto | Self::OffHighAuto
        )
    }

    /// Whether `mode` is a member of the sequence. `On` and `Smart` are aliases
    /// and are never members themselves.
    pub fn contains(self, mode: FanModeEnum) -> bool {
        match mode {
            FanModeEnum::Off => true,
            FanModeEnum::Auto => self.supports_auto(),
            FanModeEnum::On | FanModeEnum::Smart => false,
            speed => self.speed_modes().contains(&speed),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, FromRepr, Serialize, Deserialize)]
#[repr(u8)]
pub enum AirflowDirectionEnum {
    #[default]
    Forward = 0,
    Reverse = 1,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum StepDirectionEnum {
    Increase = 0,
    Decrease = 1,
}

/// Blade rotation requested by a Step command.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u8)]
pub enum RotateEnum {
    Clockwise = 0,
    CounterClockwise = 1,
}

impl From<RotateEnum> for AirflowDirectionEnum {
    fn from(rotate: RotateEnum) -> Self {
        match rotate {
            RotateEnum::Clockwise => AirflowDirectionEnum::Forward,
            RotateEnum::CounterClockwise => AirflowDirectionEnum::Reverse,
        }
    }
}

/// Attribute IDs for the Fan Control cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr)]
#[repr(u32)]
pub enum AttributeId {
    FanMode = 0x0000,
    FanModeSequence = 0x0001,
    PercentSetting = 0x0002,
    PercentCurrent = 0x0003,
    SpeedMax = 0x0004,
    SpeedSetting = 0x0005,
    SpeedCurrent = 0x0006,
    RockSupport = 0x0007,
    RockSetting = 0x0008,
    WindSupport = 0x0009,
    WindSetting = 0x000A,
    AirflowDirection = 0x000B,
}

impl AttributeId {
    pub const ALL: [AttributeId; 12] = [
        AttributeId::FanMode,
        AttributeId::FanModeSequence,
        AttributeId::PercentSetting,
        AttributeId::PercentCurrent,
        AttributeId::SpeedMax,
        AttributeId::SpeedSetting,
        AttributeId::SpeedCurrent,
        AttributeId::RockSupport,
        AttributeId::RockSetting,
        AttributeId::WindSupport,
        AttributeId::WindSetting,
        AttributeId::AirflowDirection,
    ];

    /// Attributes a client may write (access RW).
    pub fn is_writable(self) -> bool {
        matches!(
            self,
            AttributeId::FanMode
                | AttributeId::PercentSetting
                | AttributeId::SpeedSetting
                | AttributeId::RockSetting
                | AttributeId::WindSetting
                | AttributeId::AirflowDirection
        )
    }
}

/// Command IDs for the Fan Control cluster
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum CommandId {
    Step = 0x00,
}

/// Concrete path of one attribute instance, used for dirty marking.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct AttributePath {
    pub endpoint_id: EndpointId,
    pub cluster_id: u32,
    pub attribute_id: AttributeId,
}

impl AttributePath {
    pub fn new(endpoint_id: EndpointId, attribute_id: AttributeId) -> Self {
        Self {
            endpoint_id,
            cluster_id: super::CLUSTER_ID,
            attribute_id,
        }
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/0x{:04X}/{:?}",
            self.endpoint_id, self.cluster_id, self.attribute_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_membership() {
        let seq = FanModeSequenceEnum::OffLowHigh;
        assert!(seq.contains(FanModeEnum::Off));
        assert!(seq.contains(FanModeEnum::Low));
        assert!(!seq.contains(FanModeEnum::Medium));
        assert!(!seq.contains(FanModeEnum::Auto));
        assert!(FanModeSequenceEnum::OffHighAuto.contains(FanModeEnum::Auto));
        assert!(!FanModeSequenceEnum::OffHighAuto.contains(FanModeEnum::Low));
    }

    #[test]
    fn test_raw_values() {
        assert_eq!(FanModeEnum::from_repr(5), Some(FanModeEnum::Auto));
        assert_eq!(FanModeEnum::from_repr(7), None);
        assert_eq!(AttributeId::from_repr(0x000B), Some(AttributeId::AirflowDirection));
        assert_eq!(StepDirectionEnum::from_repr(2), None);
        assert_eq!(
            AirflowDirectionEnum::from(RotateEnum::CounterClockwise),
            AirflowDirectionEnum::Reverse
        );
    }

    #[test]
    fn test_bitmap_subset() {
        let support = RockBitmap::LEFT_RIGHT | RockBitmap::ROUND;
        assert!(support.contains(RockBitmap::ROUND));
        assert!(!support.contains(RockBitmap::UP_DOWN | RockBitmap::ROUND));
        assert_eq!(RockBitmap::from_bits(0x08), None);
    }
}
