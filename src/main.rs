use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep_until};

use fan_control_cluster::clusters::fan_control::{
    AttributeId, EndpointId, FanControlServer, FanControlStorage, JsonFileStorage, MemoryStorage,
    PatternTimer,
};
use fan_control_cluster::config::{Config, load_dotenv, parse_features};
use fan_control_cluster::device::{FanAction, SimulatedFanDriver};
use fan_control_cluster::notifier::DirtyReporter;

#[derive(Parser)]
#[command(name = "fan-control-demo")]
#[command(about = "Drive a simulated fan through the Fan Control cluster")]
struct Cli {
    /// Endpoint hosting the fan
    #[arg(long, env = "FAN_ENDPOINT_ID")]
    endpoint: Option<EndpointId>,

    /// Comma separated features (multi-speed,auto,rocking,wind,step,airflow-direction)
    #[arg(long, env = "FAN_FEATURES")]
    features: Option<String>,

    /// Number of speed steps
    #[arg(long, env = "FAN_SPEED_MAX")]
    speed_max: Option<u8>,

    /// JSON file the settings are persisted to
    #[arg(long, env = "FAN_STATE_FILE")]
    state_file: Option<PathBuf>,

    /// Keep settings in memory only
    #[arg(long)]
    no_persist: bool,

    /// Actions to run in order, e.g. `mode=low rock=1 wait=5 step=up,wrap`
    actions: Vec<String>,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn log_attributes(server: &FanControlServer, endpoint_id: EndpointId) {
    for attribute in AttributeId::ALL {
        if let Ok(value) = server.read(endpoint_id, attribute as u32) {
            info!("  {:?} = {:?}", attribute, value);
        }
    }
}

/// Hand expired pattern timers back to the cluster until `deadline`.
async fn run_timers_until(
    server: &FanControlServer,
    timers: &mut mpsc::UnboundedReceiver<PatternTimer>,
    deadline: Instant,
) {
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return,
            timer = timers.recv() => match timer {
                Some(timer) => {
                    if let Err(e) = server.handle_pattern_timer(timer) {
                        warn!("Pattern timer on endpoint {} failed: {}", timer.endpoint_id, e);
                    }
                }
                None => return,
            },
        }
    }
}

fn main() {
    // Environment first, while the process is still single threaded
    load_dotenv(Path::new(".env"));
    run();
}

#[tokio::main]
async fn run() {
    init_logger();
    let cli = Cli::parse();
    info!("Starting fan-control-demo");

    let mut config = Config::from_env();
    if let Some(endpoint) = cli.endpoint {
        config.device.endpoint_id = endpoint;
    }
    if let Some(features) = &cli.features {
        config.device.features = parse_features(features);
    }
    if let Some(speed_max) = cli.speed_max {
        config.device.speed_max = speed_max;
    }
    if let Some(path) = cli.state_file {
        config.storage.state_file = path;
    }
    info!("Configuration loaded:");
    info!("  Endpoint: {}", config.device.endpoint_id);
    info!("  Features: {:?}", config.device.features);
    info!("  Mode sequence: {:?}", config.device.fan_mode_sequence);
    info!("  Pattern timer: {}s", config.cluster.pattern_timer_secs);

    let actions = match cli
        .actions
        .iter()
        .map(|a| a.parse::<FanAction>())
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(actions) => actions,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let storage: Arc<dyn FanControlStorage> = if cli.no_persist {
        Arc::new(MemoryStorage::new())
    } else {
        info!("  State file: {:?}", config.storage.state_file);
        Arc::new(JsonFileStorage::new(config.storage.state_file.clone()))
    };

    let reporter = Arc::new(DirtyReporter::new());
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
    let driver = Arc::new(SimulatedFanDriver::new(
        config.device.capabilities(),
        reporter.clone(),
        timer_tx,
        Handle::current(),
    ));

    let endpoint_id = config.device.endpoint_id;
    let server = FanControlServer::new(config.cluster, storage);
    let logic = match server.register_endpoint(endpoint_id, driver.clone()) {
        Ok(logic) => logic,
        Err(e) => {
            error!("Failed to initialize fan endpoint {}: {}", endpoint_id, e);
            std::process::exit(1);
        }
    };

    // Log reports the way a subscription processor would see them
    let report_task = tokio::spawn({
        let reporter = reporter.clone();
        async move {
            loop {
                let dirty = reporter.wait().await;
                let paths: Vec<String> = dirty.iter().map(ToString::to_string).collect();
                info!("[Report] {}", paths.join(", "));
            }
        }
    });

    info!("Initial state:");
    log_attributes(&server, endpoint_id);

    for action in &actions {
        match action {
            FanAction::Wait(secs) => {
                info!("Waiting {}s", secs);
                let deadline = Instant::now() + Duration::from_secs(*secs);
                run_timers_until(&server, &mut timer_rx, deadline).await;
            }
            action => match action.apply(&server, endpoint_id) {
                Ok(()) => info!("{:?}: ok", action),
                Err(status) => warn!(
                    "{:?}: {} (status 0x{:02X})",
                    action,
                    status,
                    status.im_status() as u8
                ),
            },
        }

        if let Err(e) = driver.settle(&mut logic.write()) {
            warn!("Failed to report motor state: {}", e);
        }
        // Let the report task print before the next action
        tokio::task::yield_now().await;
    }

    info!("Final state:");
    log_attributes(&server, endpoint_id);

    if let Err(e) = server.unregister_endpoint(endpoint_id) {
        warn!("Failed to unregister endpoint {}: {}", endpoint_id, e);
    }
    report_task.abort();
    info!("Shutdown complete");
}
