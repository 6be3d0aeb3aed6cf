use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::clusters::fan_control::{
    EndpointId, FanControlCapabilities, FanModeSequenceEnum, Feature, RockBitmap, WindBitmap,
};

/// `KEY=value` pairs of a dotenv file. Blank lines and `#` comments are
/// skipped, one level of matching quotes is stripped from values.
pub fn parse_dotenv(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), unquote(value.trim())))
        .filter(|(key, _)| !key.is_empty())
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|q| value.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(value)
}

/// Export the variables of the dotenv file at `path` that are not set yet.
///
/// Must run before the tokio runtime starts.
pub fn load_dotenv(path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(key).is_none() {
            // SAFETY: no other threads exist yet
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub cluster: ClusterConfig,
    pub device: DeviceConfig,
    pub storage: StorageConfig,
}

/// Behaviour of the cluster logic itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Interval of the recurring rocking / wind pattern timer
    pub pattern_timer_secs: u16,
    /// Percentage moved by one Step on fans without multi-speed
    pub percent_step: u8,
}

/// Capabilities of the simulated fan used by the demo binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub endpoint_id: EndpointId,
    pub features: Feature,
    pub fan_mode_sequence: FanModeSequenceEnum,
    pub speed_max: u8,
    pub rock_support: RockBitmap,
    pub wind_support: WindBitmap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub state_file: PathBuf,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            pattern_timer_secs: 2,
            percent_step: 10,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            endpoint_id: 1,
            features: Feature::MULTI_SPEED
                | Feature::AUTO
                | Feature::ROCKING
                | Feature::WIND
                | Feature::STEP
                | Feature::AIRFLOW_DIRECTION,
            fan_mode_sequence: FanModeSequenceEnum::OffLowMedHighAuto,
            speed_max: 10,
            rock_support: RockBitmap::LEFT_RIGHT | RockBitmap::UP_DOWN,
            wind_support: WindBitmap::SLEEP_WIND | WindBitmap::NATURAL_WIND,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            state_file: base.join("fan-control-cluster").join("fan-state.json"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            device: DeviceConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn capabilities(&self) -> FanControlCapabilities {
        FanControlCapabilities::new(self.features, self.fan_mode_sequence)
            .with_speed_max(self.speed_max)
            .with_rock_support(self.rock_support)
            .with_wind_support(self.wind_support)
    }
}

/// Parse a comma separated feature list such as `multi-speed,step,rocking`.
///
/// Unknown names are ignored with a warning.
pub fn parse_features(list: &str) -> Feature {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .fold(Feature::empty(), |features, name| {
            let feature = match name.to_ascii_lowercase().as_str() {
                "multi-speed" | "spd" => Feature::MULTI_SPEED,
                "auto" | "aut" => Feature::AUTO,
                "rocking" | "rck" => Feature::ROCKING,
                "wind" | "wnd" => Feature::WIND,
                "step" => Feature::STEP,
                "airflow-direction" | "reverse" | "dir" => Feature::AIRFLOW_DIRECTION,
                other => {
                    log::warn!("Unknown fan feature '{}'", other);
                    Feature::empty()
                }
            };
            features | feature
        })
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("FAN_PATTERN_TIMER_SECS")
            && let Ok(s) = secs.parse::<u16>()
            && s > 0
        {
            config.cluster.pattern_timer_secs = s;
        }
        if let Ok(step) = std::env::var("FAN_PERCENT_STEP")
            && let Ok(s) = step.parse::<u8>()
            && (1..=100).contains(&s)
        {
            config.cluster.percent_step = s;
        }

        // Device configuration
        if let Ok(endpoint) = std::env::var("FAN_ENDPOINT_ID")
            && let Ok(e) = endpoint.parse()
        {
            config.device.endpoint_id = e;
        }
        if let Ok(features) = std::env::var("FAN_FEATURES") {
            config.device.features = parse_features(&features);
        }
        if let Ok(sequence) = std::env::var("FAN_MODE_SEQUENCE")
            && let Ok(raw) = sequence.parse::<u8>()
            && let Some(s) = FanModeSequenceEnum::from_repr(raw)
        {
            config.device.fan_mode_sequence = s;
        }
        if let Ok(speed_max) = std::env::var("FAN_SPEED_MAX")
            && let Ok(s) = speed_max.parse()
        {
            config.device.speed_max = s;
        }
        if let Ok(rock) = std::env::var("FAN_ROCK_SUPPORT")
            && let Ok(bits) = rock.parse::<u8>()
        {
            config.device.rock_support = RockBitmap::from_bits_truncate(bits);
        }
        if let Ok(wind) = std::env::var("FAN_WIND_SUPPORT")
            && let Ok(bits) = wind.parse::<u8>()
        {
            config.device.wind_support = WindBitmap::from_bits_truncate(bits);
        }

        if let Ok(path) = std::env::var("FAN_STATE_FILE") {
            config.storage.state_file = PathBuf::from(path);
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_features() {
        assert_eq!(
            parse_features("multi-speed, step,ROCKING"),
            Feature::MULTI_SPEED | Feature::STEP | Feature::ROCKING
        );
        assert_eq!(parse_features("dir,bogus"), Feature::AIRFLOW_DIRECTION);
        assert_eq!(parse_features(""), Feature::empty());
    }

    #[test]
    fn test_default_device_capabilities_are_valid() {
        let caps = DeviceConfig::default().capabilities();
        assert!(caps.validate().is_ok());
        assert_eq!(caps.speed_max, 10);
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# fan\n\nFAN_SPEED_MAX = 5\nFAN_FEATURES=\"step, auto\"\nFAN_STATE_FILE='/tmp/a b.json'\nno separator\n=orphan\n";
        let pairs: Vec<_> = parse_dotenv(content).collect();
        assert_eq!(
            pairs,
            vec![
                ("FAN_SPEED_MAX", "5"),
                ("FAN_FEATURES", "step, auto"),
                ("FAN_STATE_FILE", "/tmp/a b.json"),
            ]
        );
    }

    #[test]
    fn test_unquote_needs_matching_quotes() {
        assert_eq!(unquote("\"x\""), "x");
        assert_eq!(unquote("'x"), "'x");
        assert_eq!(unquote("\"x'"), "\"x'");
        assert_eq!(unquote("\""), "\"");
    }

    #[test]
    fn test_load_dotenv_missing_file_is_ignored() {
        load_dotenv(Path::new("/nonexistent/fan-control/.env"));
    }

    #[test]
    fn test_default_cluster_config() {
        let config = ClusterConfig::default();
        assert_eq!(config.pattern_timer_secs, 2);
        assert_eq!(config.percent_step, 10);
    }
}
