//! Demo actions given on the command line.
//!
//! Syntax, one action per argument:
//!
//! - `mode=off|low|medium|high|on|auto|smart`
//! - `percent=<0-100>`, `speed=<n>`
//! - `rock=<bits>`, `wind=<bits>` (raw bitmap values)
//! - `airflow=forward|reverse`
//! - `step=up|down[,wrap][,off][,cw|ccw][,speed=<n>]`
//! - `wait=<seconds>` keeps the loop running so pattern timers fire

use std::str::FromStr;

use crate::clusters::fan_control::{
    AirflowDirectionEnum, AttributeId, ClusterResult, CommandId, EndpointId, FanControlServer,
    FanModeEnum, RotateEnum, StepDirectionEnum, StepRequest,
};
use crate::error::FanControlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanAction {
    Write { attribute: AttributeId, raw: u8 },
    Step(StepRequest),
    Wait(u64),
}

impl FanAction {
    /// Run against `endpoint_id`. `Wait` is left to the caller.
    pub fn apply(&self, server: &FanControlServer, endpoint_id: EndpointId) -> ClusterResult {
        match self {
            FanAction::Write { attribute, raw } => {
                server.write_raw(endpoint_id, *attribute as u32, *raw)
            }
            FanAction::Step(request) => {
                server.invoke(endpoint_id, CommandId::Step as u32, request)
            }
            FanAction::Wait(_) => Ok(()),
        }
    }
}

fn parse_u8(action: &str, value: &str) -> Result<u8, FanControlError> {
    value
        .trim()
        .parse()
        .map_err(|_| FanControlError::InvalidAction(action.to_string()))
}

fn parse_step(action: &str, args: &str) -> Result<StepRequest, FanControlError> {
    let invalid = || FanControlError::InvalidAction(action.to_string());
    let mut parts = args.split(',').map(str::trim);

    let direction = match parts.next() {
        Some("up") | Some("increase") => StepDirectionEnum::Increase,
        Some("down") | Some("decrease") => StepDirectionEnum::Decrease,
        _ => return Err(invalid()),
    };
    let mut request = StepRequest::new(direction, 0);
    for part in parts {
        request = match part {
            "wrap" => request.with_wrap(true),
            "off" => request.with_lowest_off(true),
            "cw" => request.with_rotate(RotateEnum::Clockwise),
            "ccw" => request.with_rotate(RotateEnum::CounterClockwise),
            other => match other.strip_prefix("speed=") {
                Some(speed) => StepRequest {
                    speed: parse_u8(action, speed)?,
                    ..request
                },
                None => return Err(invalid()),
            },
        };
    }
    Ok(request)
}

impl FromStr for FanAction {
    type Err = FanControlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || FanControlError::InvalidAction(s.to_string());
        let (key, value) = s.split_once('=').ok_or_else(invalid)?;

        let write = |attribute: AttributeId, raw: u8| FanAction::Write { attribute, raw };
        let action = match key.trim() {
            "mode" => {
                let mode = match value.trim().to_ascii_lowercase().as_str() {
                    "off" => FanModeEnum::Off,
                    "low" => FanModeEnum::Low,
                    "medium" | "med" => FanModeEnum::Medium,
                    "high" => FanModeEnum::High,
                    "on" => FanModeEnum::On,
                    "auto" => FanModeEnum::Auto,
                    "smart" => FanModeEnum::Smart,
                    _ => return Err(invalid()),
                };
                write(AttributeId::FanMode, mode as u8)
            }
            "percent" => write(AttributeId::PercentSetting, parse_u8(s, value)?),
            "speed" => write(AttributeId::SpeedSetting, parse_u8(s, value)?),
            "rock" => write(AttributeId::RockSetting, parse_u8(s, value)?),
            "wind" => write(AttributeId::WindSetting, parse_u8(s, value)?),
            "airflow" => {
                let direction = match value.trim() {
                    "forward" => AirflowDirectionEnum::Forward,
                    "reverse" => AirflowDirectionEnum::Reverse,
                    _ => return Err(invalid()),
                };
                write(AttributeId::AirflowDirection, direction as u8)
            }
            "step" => FanAction::Step(parse_step(s, value)?),
            "wait" => FanAction::Wait(value.trim().parse().map_err(|_| invalid())?),
            _ => return Err(invalid()),
        };
        Ok(action)
    }
}
