//! Attribute storage of one fan endpoint.
//!
//! Attributes are split into the group that survives a restart
//! ([`PersistentAttributes`], written to storage on every committed change)
//! and the driver-reported group ([`VolatileAttributes`], never persisted).
//! The helpers here are pure: they compute reconciled values and never touch
//! the driver or the storage.

use log::warn;
use serde::{Deserialize, Serialize};

use super::capabilities::FanControlCapabilities;
use super::types::{
    AirflowDirectionEnum, AttributeId, FanModeEnum, FanModeSequenceEnum, Feature, Percent,
    RockBitmap, WindBitmap,
};

/// Largest percentage value.
pub const PERCENT_MAX: Percent = 100;

/// Writable settings. These are what storage loads and persists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentAttributes {
    pub fan_mode: FanModeEnum,
    pub percent_setting: Percent,
    pub speed_setting: u8,
    pub rock_setting: RockBitmap,
    pub wind_setting: WindBitmap,
    pub airflow_direction: AirflowDirectionEnum,
}

/// Values reported by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VolatileAttributes {
    pub percent_current: Percent,
    pub speed_current: u8,
}

/// All attribute state of one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanControlClusterState {
    pub persistent: PersistentAttributes,
    pub volatile: VolatileAttributes,
}

impl FanControlClusterState {
    /// Default state: fan off, every setting zero or empty, airflow forward.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the fan is running, i.e. not in the `Off` mode.
    pub fn is_running(&self) -> bool {
        self.persistent.fan_mode != FanModeEnum::Off
    }

    /// Whether a patterned motion (rocking or wind) should currently be driven.
    pub fn pattern_active(&self) -> bool {
        self.is_running()
            && (!self.persistent.rock_setting.is_empty()
                || !self.persistent.wind_setting.is_empty())
    }

    /// Clamp every value into the bounds the capabilities allow.
    pub fn constrain_to(&mut self, caps: &FanControlCapabilities) {
        let speed_max = caps.effective_speed_max();
        let p = &mut self.persistent;
        p.fan_mode = normalize_mode(caps.fan_mode_sequence, p.fan_mode)
            .filter(|mode| caps.fan_mode_sequence.contains(*mode))
            .unwrap_or(FanModeEnum::Off);
        p.percent_setting = p.percent_setting.min(PERCENT_MAX);
        p.speed_setting = p.speed_setting.min(speed_max);
        p.rock_setting &= caps.effective_rock_support();
        p.wind_setting &= caps.effective_wind_support();
        if !caps.has(Feature::AIRFLOW_DIRECTION) {
            p.airflow_direction = AirflowDirectionEnum::Forward;
        }

        let v = &mut self.volatile;
        v.percent_current = v.percent_current.min(PERCENT_MAX);
        v.speed_current = v.speed_current.min(speed_max);
    }

    /// Take over the stored settings that are valid for these capabilities.
    ///
    /// Invalid fields are skipped with a warning. The speed settings and the
    /// fan mode are then reconciled from the restored percentage (or from the
    /// speed when only that was valid), so the result is always consistent.
    pub fn restore(&mut self, stored: &PersistentAttributes, caps: &FanControlCapabilities) {
        let sequence = caps.fan_mode_sequence;
        let speed_max = caps.effective_speed_max();
        let p = &mut self.persistent;

        let mode = normalize_mode(sequence, stored.fan_mode).filter(|m| sequence.contains(*m));
        if mode.is_none() {
            warn!("Ignoring stored fan mode {:?}", stored.fan_mode);
        }

        let percent_valid = stored.percent_setting <= PERCENT_MAX;
        let speed_valid = stored.speed_setting <= speed_max;
        if percent_valid {
            p.percent_setting = stored.percent_setting;
        } else {
            warn!("Ignoring stored percent setting {}", stored.percent_setting);
            if speed_valid {
                p.percent_setting = speed_to_percent(speed_max, stored.speed_setting);
            }
        }
        if !speed_valid {
            warn!("Ignoring stored speed setting {}", stored.speed_setting);
        }

        match mode.unwrap_or_else(|| percent_to_mode(sequence, p.percent_setting)) {
            FanModeEnum::Off => {
                p.fan_mode = FanModeEnum::Off;
                p.percent_setting = 0;
                p.speed_setting = 0;
            }
            FanModeEnum::Auto => {
                p.fan_mode = FanModeEnum::Auto;
                p.speed_setting = percent_to_speed(speed_max, p.percent_setting);
            }
            _ => {
                p.fan_mode = percent_to_mode(sequence, p.percent_setting);
                p.speed_setting = percent_to_speed(speed_max, p.percent_setting);
            }
        }

        if caps.effective_rock_support().contains(stored.rock_setting) {
            p.rock_setting = stored.rock_setting;
        } else {
            warn!("Ignoring stored rock setting {:?}", stored.rock_setting);
        }

        if caps.effective_wind_support().contains(stored.wind_setting) {
            p.wind_setting = stored.wind_setting;
        } else {
            warn!("Ignoring stored wind setting {:?}", stored.wind_setting);
        }

        if caps.has(Feature::AIRFLOW_DIRECTION)
            || stored.airflow_direction == AirflowDirectionEnum::Forward
        {
            p.airflow_direction = stored.airflow_direction;
        } else {
            warn!("Ignoring stored airflow direction {:?}", stored.airflow_direction);
        }
    }

    /// Attributes whose values differ between `self` and `other`.
    pub fn changed_attributes(&self, other: &Self) -> Vec<AttributeId> {
        let (a, b) = (&self.persistent, &other.persistent);
        let (va, vb) = (&self.volatile, &other.volatile);
        let candidates = [
            (AttributeId::FanMode, a.fan_mode != b.fan_mode),
            (AttributeId::PercentSetting, a.percent_setting != b.percent_setting),
            (AttributeId::PercentCurrent, va.percent_current != vb.percent_current),
            (AttributeId::SpeedSetting, a.speed_setting != b.speed_setting),
            (AttributeId::SpeedCurrent, va.speed_current != vb.speed_current),
            (AttributeId::RockSetting, a.rock_setting != b.rock_setting),
            (AttributeId::WindSetting, a.wind_setting != b.wind_setting),
            (AttributeId::AirflowDirection, a.airflow_direction != b.airflow_direction),
        ];
        candidates
            .into_iter()
            .filter_map(|(id, changed)| changed.then_some(id))
            .collect()
    }
}

/// Resolve the `On` and `Smart` aliases to the mode that is actually stored.
///
/// Returns `None` for `Smart` on sequences without a speed mode to fall back to,
/// which cannot happen for the defined sequences but keeps the mapping total.
pub fn normalize_mode(sequence: FanModeSequenceEnum, mode: FanModeEnum) -> Option<FanModeEnum> {
    match mode {
        FanModeEnum::On => Some(FanModeEnum::High),
        FanModeEnum::Smart if sequence.supports_auto() => Some(FanModeEnum::Auto),
        FanModeEnum::Smart => sequence.speed_modes().last().copied(),
        other => Some(other),
    }
}

/// Percentage representing a speed mode: k * 100 / n for the k-th of n modes.
pub fn mode_to_percent(sequence: FanModeSequenceEnum, mode: FanModeEnum) -> Option<Percent> {
    let modes = sequence.speed_modes();
    let n = modes.len() as u16;
    let k = modes.iter().position(|m| *m == mode)? as u16 + 1;
    Some((k * PERCENT_MAX as u16 / n) as Percent)
}

/// Speed mode of the sequence covering the given percentage band.
pub fn percent_to_mode(sequence: FanModeSequenceEnum, percent: Percent) -> FanModeEnum {
    if percent == 0 {
        return FanModeEnum::Off;
    }
    let modes = sequence.speed_modes();
    let n = modes.len() as u16;
    let percent = percent.min(PERCENT_MAX) as u16;
    // ceil(percent * n / 100), always in 1..=n for percent in 1..=100
    let index = (percent * n).div_ceil(PERCENT_MAX as u16) as usize;
    modes[index.clamp(1, modes.len()) - 1]
}

/// SpeedSetting matching a percentage: ceil(speed_max * percent / 100).
pub fn percent_to_speed(speed_max: u8, percent: Percent) -> u8 {
    let percent = percent.min(PERCENT_MAX) as u16;
    (speed_max as u16 * percent).div_ceil(PERCENT_MAX as u16) as u8
}

/// PercentSetting matching a speed: floor(speed * 100 / speed_max).
pub fn speed_to_percent(speed_max: u8, speed: u8) -> Percent {
    if speed_max == 0 {
        return 0;
    }
    let speed = speed.min(speed_max) as u16;
    (speed * PERCENT_MAX as u16 / speed_max as u16) as Percent
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state() {
        let state = FanControlClusterState::new();
        assert_eq!(state.persistent.fan_mode, FanModeEnum::Off);
        assert_eq!(state.persistent.percent_setting, 0);
        assert_eq!(state.persistent.airflow_direction, AirflowDirectionEnum::Forward);
        assert!(!state.is_running());
        assert!(!state.pattern_active());
    }

    #[test]
    fn test_mode_percent_mapping() {
        let seq = FanModeSequenceEnum::OffLowMedHigh;
        assert_eq!(mode_to_percent(seq, FanModeEnum::Low), Some(33));
        assert_eq!(mode_to_percent(seq, FanModeEnum::Medium), Some(66));
        assert_eq!(mode_to_percent(seq, FanModeEnum::High), Some(100));
        assert_eq!(mode_to_percent(seq, FanModeEnum::Auto), None);

        assert_eq!(percent_to_mode(seq, 0), FanModeEnum::Off);
        assert_eq!(percent_to_mode(seq, 1), FanModeEnum::Low);
        assert_eq!(percent_to_mode(seq, 33), FanModeEnum::Low);
        assert_eq!(percent_to_mode(seq, 34), FanModeEnum::Medium);
        assert_eq!(percent_to_mode(seq, 67), FanModeEnum::High);
        assert_eq!(percent_to_mode(seq, 100), FanModeEnum::High);

        let seq = FanModeSequenceEnum::OffLowHigh;
        assert_eq!(mode_to_percent(seq, FanModeEnum::Low), Some(50));
        assert_eq!(percent_to_mode(seq, 50), FanModeEnum::Low);
        assert_eq!(percent_to_mode(seq, 51), FanModeEnum::High);

        assert_eq!(percent_to_mode(FanModeSequenceEnum::OffHigh, 1), FanModeEnum::High);
    }

    #[test]
    fn test_speed_percent_mapping() {
        assert_eq!(percent_to_speed(10, 0), 0);
        assert_eq!(percent_to_speed(10, 1), 1);
        assert_eq!(percent_to_speed(10, 55), 6);
        assert_eq!(percent_to_speed(10, 100), 10);
        assert_eq!(speed_to_percent(10, 1), 10);
        assert_eq!(speed_to_percent(3, 1), 33);
        assert_eq!(speed_to_percent(3, 3), 100);
        assert_eq!(speed_to_percent(0, 3), 0);
        for speed in 0..=3 {
            assert_eq!(percent_to_speed(3, speed_to_percent(3, speed)), speed);
        }
    }

    #[test]
    fn test_normalize_mode() {
        assert_eq!(
            normalize_mode(FanModeSequenceEnum::OffLowHigh, FanModeEnum::On),
            Some(FanModeEnum::High)
        );
        assert_eq!(
            normalize_mode(FanModeSequenceEnum::OffLowHighAuto, FanModeEnum::Smart),
            Some(FanModeEnum::Auto)
        );
        assert_eq!(
            normalize_mode(FanModeSequenceEnum::OffLowHigh, FanModeEnum::Smart),
            Some(FanModeEnum::High)
        );
    }

    #[test]
    fn test_restore_skips_invalid_fields() {
        let caps = FanControlCapabilities::new(Feature::MULTI_SPEED, FanModeSequenceEnum::OffLowHigh)
            .with_speed_max(5);
        let stored = PersistentAttributes {
            fan_mode: FanModeEnum::Medium,
            percent_setting: 40,
            speed_setting: 9,
            rock_setting: RockBitmap::ROUND,
            wind_setting: WindBitmap::empty(),
            airflow_direction: AirflowDirectionEnum::Reverse,
        };
        let mut state = FanControlClusterState::new();
        state.restore(&stored, &caps);

        // Medium is not in the sequence, the mode follows the percentage
        assert_eq!(state.persistent.fan_mode, FanModeEnum::Low);
        assert_eq!(state.persistent.percent_setting, 40);
        assert_eq!(state.persistent.speed_setting, 2);
        assert_eq!(state.persistent.rock_setting, RockBitmap::empty());
        assert_eq!(state.persistent.airflow_direction, AirflowDirectionEnum::Forward);
    }

    #[test]
    fn test_restore_derives_speed_from_percent() {
        let caps = FanControlCapabilities::new(Feature::MULTI_SPEED, FanModeSequenceEnum::OffLowHigh)
            .with_speed_max(5);
        let stored = PersistentAttributes {
            fan_mode: FanModeEnum::High,
            percent_setting: 100,
            speed_setting: 9,
            ..Default::default()
        };
        let mut state = FanControlClusterState::new();
        state.restore(&stored, &caps);

        assert_eq!(state.persistent.fan_mode, FanModeEnum::High);
        assert_eq!(state.persistent.percent_setting, 100);
        assert_eq!(state.persistent.speed_setting, 5);
    }

    #[test]
    fn test_restore_reconciles_mismatched_settings() {
        let caps = FanControlCapabilities::new(
            Feature::MULTI_SPEED | Feature::AUTO,
            FanModeSequenceEnum::OffLowHighAuto,
        )
        .with_speed_max(10);

        let mut state = FanControlClusterState::new();
        state.restore(
            &PersistentAttributes {
                fan_mode: FanModeEnum::Off,
                percent_setting: 60,
                speed_setting: 3,
                ..Default::default()
            },
            &caps,
        );
        assert_eq!(state.persistent.percent_setting, 0);
        assert_eq!(state.persistent.speed_setting, 0);
        assert!(!state.is_running());

        let mut state = FanControlClusterState::new();
        state.restore(
            &PersistentAttributes {
                fan_mode: FanModeEnum::Low,
                percent_setting: 90,
                speed_setting: 1,
                ..Default::default()
            },
            &caps,
        );
        assert_eq!(state.persistent.fan_mode, FanModeEnum::High);
        assert_eq!(state.persistent.speed_setting, 9);

        // Auto keeps its mode, the speed still follows the percentage
        let mut state = FanControlClusterState::new();
        state.restore(
            &PersistentAttributes {
                fan_mode: FanModeEnum::Auto,
                percent_setting: 30,
                speed_setting: 8,
                ..Default::default()
            },
            &caps,
        );
        assert_eq!(state.persistent.fan_mode, FanModeEnum::Auto);
        assert_eq!(state.persistent.speed_setting, 3);

        // Out of range percentage falls back to the stored speed
        let mut state = FanControlClusterState::new();
        state.restore(
            &PersistentAttributes {
                fan_mode: FanModeEnum::High,
                percent_setting: 150,
                speed_setting: 7,
                ..Default::default()
            },
            &caps,
        );
        assert_eq!(state.persistent.percent_setting, 70);
        assert_eq!(state.persistent.speed_setting, 7);
        assert_eq!(state.persistent.fan_mode, FanModeEnum::High);
    }

    #[test]
    fn test_constrain_to_capabilities() {
        let caps = FanControlCapabilities::new(Feature::ROCKING, FanModeSequenceEnum::OffHigh)
            .with_rock_support(RockBitmap::LEFT_RIGHT);
        let mut state = FanControlClusterState::new();
        state.persistent.speed_setting = 4;
        state.persistent.rock_setting = RockBitmap::LEFT_RIGHT | RockBitmap::UP_DOWN;
        state.persistent.fan_mode = FanModeEnum::Low;
        state.constrain_to(&caps);

        assert_eq!(state.persistent.speed_setting, 0);
        assert_eq!(state.persistent.rock_setting, RockBitmap::LEFT_RIGHT);
        assert_eq!(state.persistent.fan_mode, FanModeEnum::Off);
    }

    #[test]
    fn test_changed_attributes() {
        let before = FanControlClusterState::new();
        let mut after = before;
        after.persistent.fan_mode = FanModeEnum::High;
        after.volatile.speed_current = 2;
        assert_eq!(
            after.changed_attributes(&before),
            vec![AttributeId::FanMode, AttributeId::SpeedCurrent]
        );
        assert!(before.changed_attributes(&before).is_empty());
    }
}
