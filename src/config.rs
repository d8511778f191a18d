use anyhow::{bail, Context, Result};
use greenhouse_control::clock::DEFAULT_UTC_OFFSET_SECS;
use greenhouse_control::relay::DEFAULT_THRESHOLD_CELSIUS;
use greenhouse_control::schedule::{CONTROL_INTERVAL_MS, TELEMETRY_INTERVAL_MS};
use greenhouse_control::telemetry::DEFAULT_RECORDS_PREFIX;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "GREENHOUSE_CONFIG";
pub const DEVICE_ID_ENV: &str = "GREENHOUSE_DEVICE_ID";
const DEFAULT_CONFIG_PATH: &str = "greenhouse.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device_id: String,
    pub records_prefix: String,
    pub control_interval_ms: u32,
    pub telemetry_interval_ms: u32,
    pub threshold_celsius: f32,
    pub hysteresis_celsius: f32,
    pub utc_offset_secs: i64,
    pub loop_delay_ms: u64,
    pub sensors: SensorPaths,
    pub relay: RelayConfig,
    pub uplink: UplinkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_id: String::new(),
            records_prefix: DEFAULT_RECORDS_PREFIX.to_string(),
            control_interval_ms: CONTROL_INTERVAL_MS,
            telemetry_interval_ms: TELEMETRY_INTERVAL_MS,
            threshold_celsius: DEFAULT_THRESHOLD_CELSIUS,
            hysteresis_celsius: 0.0,
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
            loop_delay_ms: 10,
            sensors: SensorPaths::default(),
            relay: RelayConfig::default(),
            uplink: UplinkConfig::default(),
        }
    }
}

/// Linux IIO attribute files. The dht11 driver reports milli-units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorPaths {
    pub temperature: PathBuf,
    pub humidity: PathBuf,
    pub light: PathBuf,
}

impl Default for SensorPaths {
    fn default() -> Self {
        SensorPaths {
            temperature: "/sys/bus/iio/devices/iio:device0/in_temp_input".into(),
            humidity: "/sys/bus/iio/devices/iio:device0/in_humidityrelative_input".into(),
            light: "/sys/bus/iio/devices/iio:device1/in_voltage0_raw".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RelayConfig {
    Gpio {
        value_path: PathBuf,
        #[serde(default)]
        active_low: bool,
    },
    Udp {
        host: String,
    },
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig::Gpio {
            value_path: "/sys/class/gpio/gpio5/value".into(),
            active_low: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum UplinkConfig {
    File {
        root: PathBuf,
    },
    Udp {
        addr: String,
        #[serde(default = "default_uplink_timeout_ms")]
        timeout_ms: u64,
    },
}

fn default_uplink_timeout_ms() -> u64 {
    5000
}

impl Default for UplinkConfig {
    fn default() -> Self {
        UplinkConfig::File {
            root: "/var/lib/greenhouse".into(),
        }
    }
}

impl Config {
    /// Reads `$GREENHOUSE_CONFIG` (or `greenhouse.toml`), then applies env
    /// overrides. A missing file means all defaults.
    pub fn load() -> Result<Config> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Config::from_file(Path::new(&path))?;
        if let Ok(id) = env::var(DEVICE_ID_ENV) {
            config.device_id = id;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Config::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Config> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device_id.is_empty() {
            bail!("device_id is not set (config or ${})", DEVICE_ID_ENV);
        }
        if self.device_id.contains('/') {
            bail!("device_id must not contain '/': {}", self.device_id);
        }
        if self.control_interval_ms == 0 || self.telemetry_interval_ms == 0 {
            bail!("intervals must be non-zero");
        }
        if self.hysteresis_celsius.is_nan() || self.hysteresis_celsius < 0.0 {
            bail!("hysteresis_celsius must be >= 0, got {}", self.hysteresis_celsius);
        }
        Ok(())
    }
}
