//! Step command arguments and the stepping rule.

use super::types::{RotateEnum, StepDirectionEnum};

/// Decoded Step command.
///
/// `direction` and `rotate` hold the raw wire values so that out-of-range
/// values reach the cluster logic and are rejected there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    pub direction: u8,
    pub wrap: Option<bool>,
    pub lowest_off: Option<bool>,
    pub speed: u8,
    pub rotate: Option<u8>,
}

impl StepRequest {
    pub fn new(direction: StepDirectionEnum, speed: u8) -> Self {
        Self {
            direction: direction as u8,
            wrap: None,
            lowest_off: None,
            speed,
            rotate: None,
        }
    }

    pub fn with_wrap(mut self, wrap: bool) -> Self {
        self.wrap = Some(wrap);
        self
    }

    pub fn with_lowest_off(mut self, lowest_off: bool) -> Self {
        self.lowest_off = Some(lowest_off);
        self
    }

    pub fn with_rotate(mut self, rotate: RotateEnum) -> Self {
        self.rotate = Some(rotate as u8);
        self
    }
}

/// Range a Step moves within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepBounds {
    /// Lowest value reachable by Decrease
    pub floor: u8,
    pub max: u8,
    pub increment: u8,
}

impl StepBounds {
    /// Speed steps of one, floor 0 with `lowest_off`, else the lowest speed.
    pub fn speed(speed_max: u8, lowest_off: bool) -> Self {
        Self {
            floor: if lowest_off { 0 } else { 1 },
            max: speed_max,
            increment: 1,
        }
    }

    /// Percentage steps of `increment`, floor 0 with `lowest_off`, else one step.
    pub fn percent(increment: u8, lowest_off: bool) -> Self {
        let increment = increment.clamp(1, 100);
        Self {
            floor: if lowest_off { 0 } else { increment },
            max: 100,
            increment,
        }
    }
}

/// Value after one step from `current`.
///
/// Past either bound the value wraps to the opposite bound when `wrap` is set
/// and stays at the bound otherwise. A Decrease from below the floor (the fan
/// is off while the floor is the lowest running value) leaves the value alone
/// unless it wraps.
pub fn step_value(current: u8, direction: StepDirectionEnum, wrap: bool, bounds: StepBounds) -> u8 {
    let StepBounds {
        floor,
        max,
        increment,
    } = bounds;
    match direction {
        StepDirectionEnum::Increase => {
            if current >= max {
                if wrap { floor } else { max }
            } else {
                current.saturating_add(increment).min(max)
            }
        }
        StepDirectionEnum::Decrease => {
            if current <= floor {
                if wrap { max } else { current }
            } else {
                current.saturating_sub(increment).max(floor)
            }
        }
    }
}
