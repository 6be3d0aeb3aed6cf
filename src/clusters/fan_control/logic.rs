//! Fan Control cluster logic for one endpoint.
//!
//! Attribute writes and the Step command are validated against the
//! capabilities the driver reported at `init`, applied to a scratch copy of
//! the attribute state and committed in one go. A commit notifies the driver,
//! starts or cancels the pattern timer, marks every changed attribute dirty
//! and persists the persistent attribute group.

use std::sync::Arc;

use log::{debug, error, info, warn};

use super::capabilities::{FanControlCapabilities, is_attribute_supported};
use super::driver::{FanControlDriver, FanControlFunction, PatternTimer};
use super::state::{
    FanControlClusterState, PERCENT_MAX, mode_to_percent, normalize_mode, percent_to_mode,
    percent_to_speed, speed_to_percent,
};
use super::status::{ClusterResult, ClusterStatus, FanControlStatusCode};
use super::step::{StepBounds, StepRequest, step_value};
use super::types::{
    AirflowDirectionEnum, AttributeId, AttributePath, EndpointId, FanModeEnum,
    FanModeSequenceEnum, Feature, Percent, RockBitmap, RotateEnum, StepDirectionEnum, WindBitmap,
};
use super::server::AttributeValue;
use super::{CLUSTER_ID, storage::FanControlStorage};
use crate::config::ClusterConfig;
use crate::error::Result;

/// Collaborators bound by `init`.
#[derive(Clone)]
struct Binding {
    endpoint_id: EndpointId,
    driver: Arc<dyn FanControlDriver>,
    storage: Arc<dyn FanControlStorage>,
}

pub struct FanControlClusterLogic {
    config: ClusterConfig,
    binding: Option<Binding>,

    // Configuration from the driver
    capabilities: FanControlCapabilities,

    state: FanControlClusterState,

    /// Generation of the running pattern timer, if any
    pattern_timer: Option<u32>,
    timer_generation: u32,

    /// Incremented on every committed change
    version: u32,
}

impl Default for FanControlClusterLogic {
    fn default() -> Self {
        Self::new(ClusterConfig::default())
    }
}

impl FanControlClusterLogic {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            binding: None,
            capabilities: FanControlCapabilities::default(),
            state: FanControlClusterState::new(),
            pattern_timer: None,
            timer_generation: 0,
            version: 0,
        }
    }

    /// Bind the endpoint to its driver and storage.
    ///
    /// Queries the capabilities once, derives the initial attribute state and
    /// restores the persisted settings. On failure the logic stays
    /// de-initialized.
    pub fn init(
        &mut self,
        endpoint_id: EndpointId,
        storage: Arc<dyn FanControlStorage>,
        driver: Arc<dyn FanControlDriver>,
    ) -> Result<()> {
        self.deinit();

        driver.init();
        let capabilities = driver.capabilities(endpoint_id);
        capabilities.validate()?;

        // Defaults, then capability bounds, then whatever was stored
        let mut state = FanControlClusterState::new();
        state.constrain_to(&capabilities);
        if let Some(stored) = storage.load(endpoint_id)? {
            state.restore(&stored, &capabilities);
        }

        self.capabilities = capabilities;
        self.state = state;
        self.binding = Some(Binding {
            endpoint_id,
            driver,
            storage,
        });

        if self.state.pattern_active() {
            self.start_pattern_timer();
        }

        info!(
            "FanControl cluster id 0x{:04X} initialized on endpoint {} (features {:?})",
            CLUSTER_ID, endpoint_id, self.capabilities.supported_features
        );
        Ok(())
    }

    /// Release driver and storage and drop all attribute state.
    pub fn deinit(&mut self) {
        if let Some(binding) = self.binding.take() {
            if self.pattern_timer.take().is_some() {
                binding.driver.cancel_pattern_timer(binding.endpoint_id);
            }
            debug!("FanControl cluster deinitialized on endpoint {}", binding.endpoint_id);
        }
        self.pattern_timer = None;
        self.capabilities = FanControlCapabilities::default();
        self.state = FanControlClusterState::new();
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    pub fn endpoint_id(&self) -> Option<EndpointId> {
        self.binding.as_ref().map(|b| b.endpoint_id)
    }

    pub fn cluster_id(&self) -> u32 {
        CLUSTER_ID
    }

    pub fn capabilities(&self) -> &FanControlCapabilities {
        &self.capabilities
    }

    pub fn state(&self) -> &FanControlClusterState {
        &self.state
    }

    pub fn feature_map(&self) -> u32 {
        self.capabilities.supported_features.bits()
    }

    /// Change counter, bumped on every commit.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_attribute_supported(&self, attribute: AttributeId) -> bool {
        is_attribute_supported(&self.capabilities, attribute)
    }

    //
    // Attribute getters. Attributes of absent features report their default.
    //

    pub fn get_fan_mode_attribute(&self) -> FanModeEnum {
        self.state.persistent.fan_mode
    }

    pub fn get_fan_mode_sequence_attribute(&self) -> FanModeSequenceEnum {
        self.capabilities.fan_mode_sequence
    }

    pub fn get_percent_setting_attribute(&self) -> Percent {
        self.state.persistent.percent_setting
    }

    pub fn get_percent_current_attribute(&self) -> Percent {
        self.state.volatile.percent_current
    }

    pub fn get_speed_max_attribute(&self) -> u8 {
        self.capabilities.effective_speed_max()
    }

    pub fn get_speed_setting_attribute(&self) -> u8 {
        self.state.persistent.speed_setting
    }

    pub fn get_speed_current_attribute(&self) -> u8 {
        self.state.volatile.speed_current
    }

    pub fn get_rock_support_attribute(&self) -> RockBitmap {
        self.capabilities.effective_rock_support()
    }

    pub fn get_rock_setting_attribute(&self) -> RockBitmap {
        self.state.persistent.rock_setting
    }

    pub fn get_wind_support_attribute(&self) -> WindBitmap {
        self.capabilities.effective_wind_support()
    }

    pub fn get_wind_setting_attribute(&self) -> WindBitmap {
        self.state.persistent.wind_setting
    }

    pub fn get_airflow_direction_attribute(&self) -> AirflowDirectionEnum {
        self.state.persistent.airflow_direction
    }

    /// Run state, derived from the fan mode.
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Read any attribute by id.
    pub fn read_attribute(&self, attribute: AttributeId) -> ClusterResult<AttributeValue> {
        if !self.is_attribute_supported(attribute) {
            return Err(ClusterStatus::UnsupportedAttribute);
        }
        let value = match attribute {
            AttributeId::FanMode => AttributeValue::FanMode(self.get_fan_mode_attribute()),
            AttributeId::FanModeSequence => {
                AttributeValue::FanModeSequence(self.get_fan_mode_sequence_attribute())
            }
            AttributeId::PercentSetting => {
                AttributeValue::Percent(self.get_percent_setting_attribute())
            }
            AttributeId::PercentCurrent => {
                AttributeValue::Percent(self.get_percent_current_attribute())
            }
            AttributeId::SpeedMax => AttributeValue::Speed(self.get_speed_max_attribute()),
            AttributeId::SpeedSetting => AttributeValue::Speed(self.get_speed_setting_attribute()),
            AttributeId::SpeedCurrent => AttributeValue::Speed(self.get_speed_current_attribute()),
            AttributeId::RockSupport => AttributeValue::Rock(self.get_rock_support_attribute()),
            AttributeId::RockSetting => AttributeValue::Rock(self.get_rock_setting_attribute()),
            AttributeId::WindSupport => AttributeValue::Wind(self.get_wind_support_attribute()),
            AttributeId::WindSetting => AttributeValue::Wind(self.get_wind_setting_attribute()),
            AttributeId::AirflowDirection => {
                AttributeValue::AirflowDirection(self.get_airflow_direction_attribute())
            }
        };
        Ok(value)
    }

    /// Client write of any attribute by id.
    ///
    /// Read-only attributes are refused with `UnsupportedWrite`; a value of
    /// the wrong kind for the attribute is a constraint error.
    pub fn write_attribute(&mut self, attribute: AttributeId, value: AttributeValue) -> ClusterResult {
        if !self.is_attribute_supported(attribute) {
            return Err(ClusterStatus::UnsupportedAttribute);
        }
        if !attribute.is_writable() {
            return Err(ClusterStatus::UnsupportedWrite);
        }
        match (attribute, value) {
            (AttributeId::FanMode, AttributeValue::FanMode(mode)) => {
                self.set_fan_mode_attribute(mode)
            }
            (AttributeId::PercentSetting, AttributeValue::Percent(percent)) => {
                self.set_percent_setting_attribute(percent)
            }
            (AttributeId::SpeedSetting, AttributeValue::Speed(speed)) => {
                self.set_speed_setting_attribute(speed)
            }
            (AttributeId::RockSetting, AttributeValue::Rock(rock)) => {
                self.set_rock_setting_attribute(rock)
            }
            (AttributeId::WindSetting, AttributeValue::Wind(wind)) => {
                self.set_wind_setting_attribute(wind)
            }
            (AttributeId::AirflowDirection, AttributeValue::AirflowDirection(direction)) => {
                self.set_airflow_direction_attribute(direction)
            }
            _ => Err(ClusterStatus::ConstraintError),
        }
    }

    //
    // Attribute setters
    //

    pub fn set_fan_mode_attribute(&mut self, fan_mode: FanModeEnum) -> ClusterResult {
        self.check_writable(AttributeId::FanMode)?;
        let mut next = self.state;
        apply_fan_mode(&self.capabilities, &mut next, fan_mode)?;
        self.commit(next)
    }

    pub fn set_percent_setting_attribute(&mut self, percent_setting: Percent) -> ClusterResult {
        self.check_writable(AttributeId::PercentSetting)?;
        if percent_setting > PERCENT_MAX {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        apply_percent(&self.capabilities, &mut next, percent_setting);
        self.commit(next)
    }

    pub fn set_speed_setting_attribute(&mut self, speed_setting: u8) -> ClusterResult {
        self.check_writable(AttributeId::SpeedSetting)?;
        if speed_setting > self.capabilities.effective_speed_max() {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        apply_speed(&self.capabilities, &mut next, speed_setting);
        self.commit(next)
    }

    pub fn set_rock_setting_attribute(&mut self, rock_setting: RockBitmap) -> ClusterResult {
        self.check_writable(AttributeId::RockSetting)?;
        if !self.capabilities.effective_rock_support().contains(rock_setting) {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        next.persistent.rock_setting = rock_setting;
        self.commit(next)
    }

    pub fn set_wind_setting_attribute(&mut self, wind_setting: WindBitmap) -> ClusterResult {
        self.check_writable(AttributeId::WindSetting)?;
        if !self.capabilities.effective_wind_support().contains(wind_setting) {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        next.persistent.wind_setting = wind_setting;
        self.commit(next)
    }

    pub fn set_airflow_direction_attribute(
        &mut self,
        airflow_direction: AirflowDirectionEnum,
    ) -> ClusterResult {
        self.check_writable(AttributeId::AirflowDirection)?;
        let mut next = self.state;
        next.persistent.airflow_direction = airflow_direction;
        self.commit(next)
    }

    /// Actual percentage, reported by the driver. Not reachable by client writes.
    pub fn set_percent_current_attribute(&mut self, percent_current: Percent) -> ClusterResult {
        self.check_writable(AttributeId::PercentCurrent)?;
        if percent_current > PERCENT_MAX {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        next.volatile.percent_current = percent_current;
        self.commit(next)
    }

    /// Actual speed, reported by the driver. Not reachable by client writes.
    pub fn set_speed_current_attribute(&mut self, speed_current: u8) -> ClusterResult {
        self.check_writable(AttributeId::SpeedCurrent)?;
        if speed_current > self.capabilities.effective_speed_max() {
            return Err(ClusterStatus::ConstraintError);
        }
        let mut next = self.state;
        next.volatile.speed_current = speed_current;
        self.commit(next)
    }

    //
    // Command handlers
    //

    /// Move the fan one step up or down.
    ///
    /// Every argument is validated before anything is applied; rotation,
    /// speed and run state are then committed together.
    pub fn handle_step_request(&mut self, request: &StepRequest) -> ClusterResult {
        if !self.is_initialized() {
            return Err(ClusterStatus::Failure);
        }
        let caps = self.capabilities;
        if !caps.has(Feature::STEP) {
            return Err(ClusterStatus::UnsupportedCommand);
        }

        let direction = StepDirectionEnum::from_repr(request.direction)
            .ok_or(ClusterStatus::ConstraintError)?;

        if caps.has(Feature::MULTI_SPEED) && request.speed > caps.speed_max {
            return Err(ClusterStatus::InvalidCommand);
        }

        let airflow = match request.rotate {
            Some(raw) => {
                if !caps.has(Feature::AIRFLOW_DIRECTION) {
                    return Err(ClusterStatus::cluster_specific(
                        FanControlStatusCode::UnsupportedPattern,
                    ));
                }
                let rotate = RotateEnum::from_repr(raw).ok_or(ClusterStatus::ConstraintError)?;
                Some(AirflowDirectionEnum::from(rotate))
            }
            None => caps
                .has(Feature::AIRFLOW_DIRECTION)
                .then_some(AirflowDirectionEnum::Forward),
        };

        let wrap = request.wrap.unwrap_or(false);
        let lowest_off = request.lowest_off.unwrap_or(false);
        let mut next = self.state;

        if let Some(airflow) = airflow {
            next.persistent.airflow_direction = airflow;
        }

        // Without lowestOff a running fan never steps below the lowest speed,
        // even from Auto where the setting may still be 0
        let was_running = next.is_running();
        let stepped = |current: u8, bounds: StepBounds| {
            let value = step_value(current, direction, wrap, bounds);
            if was_running { value.max(bounds.floor) } else { value }
        };

        let running = if caps.has(Feature::MULTI_SPEED) {
            let bounds = StepBounds::speed(caps.speed_max, lowest_off);
            let speed = stepped(next.persistent.speed_setting, bounds);
            apply_speed(&caps, &mut next, speed);
            speed != 0
        } else {
            let bounds = StepBounds::percent(self.config.percent_step, lowest_off);
            let percent = stepped(next.persistent.percent_setting, bounds);
            apply_percent(&caps, &mut next, percent);
            percent != 0
        };

        apply_run(&caps, &mut next, running);

        debug!(
            "Step {:?} (wrap={}, lowest_off={}): speed {} -> {}, percent {} -> {}",
            direction,
            wrap,
            lowest_off,
            self.state.persistent.speed_setting,
            next.persistent.speed_setting,
            self.state.persistent.percent_setting,
            next.persistent.percent_setting
        );

        self.commit(next)
    }

    /// Pattern timer expiry delivered back by the driver.
    ///
    /// Tokens of timers that were cancelled since are ignored.
    pub fn handle_pattern_timer(&mut self, timer: PatternTimer) -> ClusterResult {
        let Some(binding) = self.binding.clone() else {
            debug!("Ignoring pattern timer for deinitialized endpoint {}", timer.endpoint_id);
            return Ok(());
        };
        if timer.endpoint_id != binding.endpoint_id || self.pattern_timer != Some(timer.generation)
        {
            debug!("Ignoring stale pattern timer on endpoint {}", timer.endpoint_id);
            return Ok(());
        }

        let result = binding.driver.on_cluster_state_change(
            binding.endpoint_id,
            FanControlFunction::PATTERN_TICK,
            self,
        );
        if let Err(status) = &result {
            warn!(
                "Driver rejected pattern tick on endpoint {}: {}",
                binding.endpoint_id, status
            );
        }

        // Recurring: arm the next period
        self.start_pattern_timer();
        result
    }

    fn check_writable(&self, attribute: AttributeId) -> ClusterResult {
        if !self.is_initialized() {
            return Err(ClusterStatus::InvalidInState);
        }
        if !self.is_attribute_supported(attribute) {
            return Err(ClusterStatus::UnsupportedAttribute);
        }
        Ok(())
    }

    /// Make `next` the current state.
    ///
    /// The driver sees the new values first and may veto them, in which case
    /// the previous state is restored and nothing else happens.
    fn commit(&mut self, next: FanControlClusterState) -> ClusterResult {
        let Some(binding) = self.binding.clone() else {
            return Err(ClusterStatus::InvalidInState);
        };

        let changed = next.changed_attributes(&self.state);
        if changed.is_empty() {
            return Ok(());
        }

        let previous = std::mem::replace(&mut self.state, next);

        let functions = functions_for(&changed);
        if !functions.is_empty()
            && let Err(status) =
                binding
                    .driver
                    .on_cluster_state_change(binding.endpoint_id, functions, self)
        {
            warn!(
                "Driver rejected {:?} change on endpoint {}: {}",
                functions, binding.endpoint_id, status
            );
            self.state = previous;
            return Err(status);
        }

        match (previous.pattern_active(), self.state.pattern_active()) {
            (false, true) => self.start_pattern_timer(),
            (true, false) => self.cancel_pattern_timer(),
            _ => {}
        }

        for attribute in &changed {
            binding
                .driver
                .mark_attribute_dirty(&AttributePath::new(binding.endpoint_id, *attribute));
        }
        self.version = self.version.wrapping_add(1);

        if previous.persistent != self.state.persistent
            && let Err(e) = binding
                .storage
                .persist(binding.endpoint_id, &self.state.persistent)
        {
            error!(
                "Failed to persist fan state of endpoint {}: {}",
                binding.endpoint_id, e
            );
        }

        Ok(())
    }

    fn start_pattern_timer(&mut self) {
        let Some(binding) = &self.binding else {
            return;
        };
        self.timer_generation = self.timer_generation.wrapping_add(1);
        let timer = PatternTimer {
            endpoint_id: binding.endpoint_id,
            generation: self.timer_generation,
        };
        self.pattern_timer = Some(timer.generation);
        binding.driver.start_pattern_timer(
            binding.endpoint_id,
            self.config.pattern_timer_secs,
            timer,
        );
    }

    fn cancel_pattern_timer(&mut self) {
        if self.pattern_timer.take().is_some()
            && let Some(binding) = &self.binding
        {
            binding.driver.cancel_pattern_timer(binding.endpoint_id);
        }
    }
}

/// Driver notification flags for a set of changed attributes.
fn functions_for(changed: &[AttributeId]) -> FanControlFunction {
    changed
        .iter()
        .fold(FanControlFunction::empty(), |flags, attribute| {
            flags
                | match attribute {
                    AttributeId::FanMode => FanControlFunction::MODE,
                    AttributeId::PercentSetting | AttributeId::SpeedSetting => {
                        FanControlFunction::SPEED
                    }
                    AttributeId::RockSetting | AttributeId::WindSetting => {
                        FanControlFunction::PATTERN
                    }
                    AttributeId::AirflowDirection => FanControlFunction::DIRECTION,
                    _ => FanControlFunction::empty(),
                }
        })
}

fn apply_fan_mode(
    caps: &FanControlCapabilities,
    next: &mut FanControlClusterState,
    fan_mode: FanModeEnum,
) -> ClusterResult {
    let sequence = caps.fan_mode_sequence;
    let mode = normalize_mode(sequence, fan_mode).ok_or(ClusterStatus::ConstraintError)?;
    if !sequence.contains(mode) || (mode == FanModeEnum::Auto && !caps.has(Feature::AUTO)) {
        return Err(ClusterStatus::ConstraintError);
    }

    let p = &mut next.persistent;
    p.fan_mode = mode;
    match mode {
        FanModeEnum::Off => {
            p.percent_setting = 0;
            p.speed_setting = 0;
        }
        // The device picks its own speed
        FanModeEnum::Auto => {}
        speed_mode => {
            let percent =
                mode_to_percent(sequence, speed_mode).ok_or(ClusterStatus::ConstraintError)?;
            p.percent_setting = percent;
            p.speed_setting = percent_to_speed(caps.effective_speed_max(), percent);
        }
    }
    Ok(())
}

fn apply_percent(caps: &FanControlCapabilities, next: &mut FanControlClusterState, percent: Percent) {
    let p = &mut next.persistent;
    p.percent_setting = percent;
    p.speed_setting = percent_to_speed(caps.effective_speed_max(), percent);
    p.fan_mode = percent_to_mode(caps.fan_mode_sequence, percent);
}

fn apply_speed(caps: &FanControlCapabilities, next: &mut FanControlClusterState, speed: u8) {
    let p = &mut next.persistent;
    p.speed_setting = speed;
    p.percent_setting = speed_to_percent(caps.effective_speed_max(), speed);
    p.fan_mode = percent_to_mode(caps.fan_mode_sequence, p.percent_setting);
}

/// Implicit run attribute of the Step command.
fn apply_run(caps: &FanControlCapabilities, next: &mut FanControlClusterState, running: bool) {
    let p = &mut next.persistent;
    if running {
        if p.fan_mode == FanModeEnum::Off {
            p.fan_mode = percent_to_mode(caps.fan_mode_sequence, p.percent_setting.max(1));
        }
    } else {
        p.fan_mode = FanModeEnum::Off;
        p.percent_setting = 0;
        p.speed_setting = 0;
    }
}
