//! Simulated fan used by the demo binary.
//!
//! Logs every change the cluster commits, runs pattern timers as tokio tasks
//! and feeds their tokens back through a channel so the owner of the cluster
//! handles them on its own loop. The motor follows the requested setting
//! when [`SimulatedFanDriver::settle`] is called.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::clusters::fan_control::{
    AttributePath, ClusterResult, EndpointId, FanControlCapabilities, FanControlClusterLogic,
    FanControlDriver, FanControlFunction, Feature, PatternTimer,
};
use crate::notifier::DirtyReporter;

/// What the simulated motor was last asked to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct MotorTarget {
    percent: u8,
    speed: u8,
}

pub struct SimulatedFanDriver {
    capabilities: FanControlCapabilities,
    reporter: Arc<DirtyReporter>,
    timer_tx: mpsc::UnboundedSender<PatternTimer>,
    runtime: Handle,
    timers: Mutex<HashMap<EndpointId, JoinHandle<()>>>,
    targets: Mutex<HashMap<EndpointId, MotorTarget>>,
    ticks: Mutex<HashMap<EndpointId, u32>>,
}

impl SimulatedFanDriver {
    pub fn new(
        capabilities: FanControlCapabilities,
        reporter: Arc<DirtyReporter>,
        timer_tx: mpsc::UnboundedSender<PatternTimer>,
        runtime: Handle,
    ) -> Self {
        Self {
            capabilities,
            reporter,
            timer_tx,
            runtime,
            timers: Mutex::new(HashMap::new()),
            targets: Mutex::new(HashMap::new()),
            ticks: Mutex::new(HashMap::new()),
        }
    }

    /// Let the motor reach its target and report the current values.
    pub fn settle(&self, cluster: &mut FanControlClusterLogic) -> ClusterResult {
        let Some(endpoint_id) = cluster.endpoint_id() else {
            return Ok(());
        };
        let target = self
            .targets
            .lock()
            .get(&endpoint_id)
            .copied()
            .unwrap_or_default();

        cluster.set_percent_current_attribute(target.percent)?;
        if cluster.capabilities().has(Feature::MULTI_SPEED) {
            cluster.set_speed_current_attribute(target.speed)?;
        }
        Ok(())
    }

    /// Number of pattern ticks seen on `endpoint_id`.
    pub fn pattern_ticks(&self, endpoint_id: EndpointId) -> u32 {
        self.ticks.lock().get(&endpoint_id).copied().unwrap_or(0)
    }

    pub fn has_running_timer(&self, endpoint_id: EndpointId) -> bool {
        self.timers
            .lock()
            .get(&endpoint_id)
            .is_some_and(|task| !task.is_finished())
    }
}

impl FanControlDriver for SimulatedFanDriver {
    fn init(&self) {
        info!("[Sim] Fan driver ready");
    }

    fn capabilities(&self, _endpoint_id: EndpointId) -> FanControlCapabilities {
        self.capabilities
    }

    fn on_cluster_state_change(
        &self,
        endpoint_id: EndpointId,
        changes: FanControlFunction,
        cluster: &FanControlClusterLogic,
    ) -> ClusterResult {
        if changes.intersects(FanControlFunction::MODE | FanControlFunction::SPEED) {
            let target = MotorTarget {
                percent: cluster.get_percent_setting_attribute(),
                speed: cluster.get_speed_setting_attribute(),
            };
            self.targets.lock().insert(endpoint_id, target);
            info!(
                "[Sim] Endpoint {}: mode {:?}, {}% (speed {}/{})",
                endpoint_id,
                cluster.get_fan_mode_attribute(),
                target.percent,
                target.speed,
                cluster.get_speed_max_attribute()
            );
        }
        if changes.contains(FanControlFunction::PATTERN) {
            info!(
                "[Sim] Endpoint {}: rock {:?}, wind {:?}",
                endpoint_id,
                cluster.get_rock_setting_attribute(),
                cluster.get_wind_setting_attribute()
            );
        }
        if changes.contains(FanControlFunction::DIRECTION) {
            info!(
                "[Sim] Endpoint {}: airflow {:?}",
                endpoint_id,
                cluster.get_airflow_direction_attribute()
            );
        }
        if changes.contains(FanControlFunction::PATTERN_TICK) {
            let mut ticks = self.ticks.lock();
            let tick = ticks.entry(endpoint_id).or_insert(0);
            *tick += 1;
            debug!("[Sim] Endpoint {}: pattern tick {}", endpoint_id, tick);
        }
        Ok(())
    }

    fn start_pattern_timer(&self, endpoint_id: EndpointId, num_seconds: u16, timer: PatternTimer) {
        let tx = self.timer_tx.clone();
        let task = self.runtime.spawn(async move {
            sleep(Duration::from_secs(u64::from(num_seconds))).await;
            // Receiver gone means the demo is shutting down
            let _ = tx.send(timer);
        });
        if let Some(previous) = self.timers.lock().insert(endpoint_id, task) {
            previous.abort();
        }
    }

    fn cancel_pattern_timer(&self, endpoint_id: EndpointId) {
        if let Some(task) = self.timers.lock().remove(&endpoint_id) {
            task.abort();
            debug!("[Sim] Endpoint {}: pattern timer cancelled", endpoint_id);
        }
    }

    fn mark_attribute_dirty(&self, path: &AttributePath) {
        self.reporter.mark_dirty(*path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::fan_control::{
        FanModeEnum, FanModeSequenceEnum, MemoryStorage, RockBitmap,
    };

    fn caps() -> FanControlCapabilities {
        FanControlCapabilities::new(
            Feature::MULTI_SPEED | Feature::ROCKING | Feature::STEP,
            FanModeSequenceEnum::OffLowMedHigh,
        )
        .with_speed_max(5)
        .with_rock_support(RockBitmap::LEFT_RIGHT)
    }

    #[tokio::test(start_paused = true)]
    async fn test_pattern_timer_token_is_delivered() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = Arc::new(DirtyReporter::new());
        let driver = Arc::new(SimulatedFanDriver::new(
            caps(),
            reporter.clone(),
            tx,
            Handle::current(),
        ));

        let mut logic = FanControlClusterLogic::default();
        logic
            .init(1, Arc::new(MemoryStorage::new()), driver.clone())
            .unwrap();
        logic.set_fan_mode_attribute(FanModeEnum::Low).unwrap();
        logic
            .set_rock_setting_attribute(RockBitmap::LEFT_RIGHT)
            .unwrap();
        assert!(driver.has_running_timer(1));

        let timer = rx.recv().await.expect("timer fires");
        logic.handle_pattern_timer(timer).unwrap();
        assert_eq!(driver.pattern_ticks(1), 1);
        assert!(reporter.has_pending());
    }

    #[tokio::test]
    async fn test_settle_reports_current_values() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let reporter = Arc::new(DirtyReporter::new());
        let driver = Arc::new(SimulatedFanDriver::new(
            caps(),
            reporter,
            tx,
            Handle::current(),
        ));

        let mut logic = FanControlClusterLogic::default();
        logic
            .init(1, Arc::new(MemoryStorage::new()), driver.clone())
            .unwrap();
        logic.set_speed_setting_attribute(3).unwrap();
        assert_eq!(logic.get_speed_current_attribute(), 0);

        driver.settle(&mut logic).unwrap();
        assert_eq!(logic.get_speed_current_attribute(), 3);
        assert_eq!(logic.get_percent_current_attribute(), 60);
    }
}
