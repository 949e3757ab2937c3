use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context as _, Result, bail};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

pub const DEFAULT_COMMUNITY_ENDPOINT: &str = "https://api.sensor.community/v1/push-sensor-data/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrimaryMode {
    /// Particulate matter, RH/T and gas.
    All,
    /// RH/T and gas without particulate matter.
    #[serde(alias = "gas")]
    GasOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecondaryMode {
    /// Keep RH/T and gas running between batches.
    Gas,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorSection,
    pub measurement: MeasurementSection,
    pub retry: RetrySection,
    pub console: ConsoleSection,
    pub data_logging: DataLoggingSection,
    pub sensor_community: SensorCommunitySection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    /// Fan auto-cleaning interval in seconds.
    pub fan_cleaning_interval: u32,

    /// Run a fan cleaning and exit instead of measuring.
    pub force_clean_fan: bool,

    pub rht_acceleration_mode: u16,

    /// Added to the compensated temperature by the device [°C].
    pub temperature_offset: f32,

    pub command_timeout_secs: u64,

    pub operation_mode: OperationMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationMode {
    pub main: PrimaryMode,
    pub secondary: SecondaryMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementSection {
    /// Seconds between two reads. Zero polls the data-ready flag instead.
    pub wait_between_measurements: u64,

    pub poll_interval_ms: u64,

    /// Reads per batch, warm-up reads included.
    pub take_measurements_for: u32,

    pub ignore_first_x_measurements: u32,

    pub sleep_until_next_batch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub read_attempts: u32,
    pub dispatch_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSection {
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataLoggingSection {
    pub enabled: bool,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorCommunitySection {
    pub enabled: bool,
    pub sensor_node_id: String,
    pub endpoint: String,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            fan_cleaning_interval: 604_800,
            force_clean_fan: false,
            rht_acceleration_mode: 0,
            temperature_offset: 0.0,
            command_timeout_secs: 5,
            operation_mode: OperationMode::default(),
        }
    }
}

impl Default for OperationMode {
    fn default() -> Self {
        Self {
            main: PrimaryMode::All,
            secondary: SecondaryMode::Gas,
        }
    }
}

impl Default for MeasurementSection {
    fn default() -> Self {
        Self {
            wait_between_measurements: 0,
            poll_interval_ms: 100,
            take_measurements_for: 300,
            ignore_first_x_measurements: 30,
            sleep_until_next_batch: 300,
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            read_attempts: 3,
            dispatch_attempts: 1,
            base_delay_ms: 200,
        }
    }
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for DataLoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            file_name: "measurements.csv".to_string(),
        }
    }
}

impl Default for SensorCommunitySection {
    fn default() -> Self {
        Self {
            enabled: false,
            sensor_node_id: "raspi-123456789".to_string(),
            endpoint: DEFAULT_COMMUNITY_ENDPOINT.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor: SensorSection::default(),
            measurement: MeasurementSection::default(),
            retry: RetrySection::default(),
            console: ConsoleSection::default(),
            data_logging: DataLoggingSection::default(),
            sensor_community: SensorCommunitySection::default(),
        }
    }
}

/// Result of looking for the configuration file.
#[derive(Debug)]
pub enum Loaded {
    Config(Config),
    /// No file existed; one with the defaults was written here.
    CreatedDefault(PathBuf),
}

impl Config {
    pub fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration, writing the defaults to `path` if it does not exist yet.
    pub fn load_or_create(path: &Path) -> Result<Loaded> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                let defaults = toml::to_string_pretty(&Config::default())
                    .context("failed to serialize default configuration")?;
                fs::write(path, defaults)
                    .with_context(|| format!("failed to write default configuration: {path:?}"))?;
                return Ok(Loaded::CreatedDefault(path.to_path_buf()));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read configuration: {path:?}"));
            }
        };

        let config =
            Self::parse(&content).with_context(|| format!("invalid configuration: {path:?}"))?;
        Ok(Loaded::Config(config))
    }

    /// Rewrites `path` with every option spelled out, so options introduced by an update appear
    /// in the user's file. Returns whether the file changed.
    pub fn write_back(&self, path: &Path) -> Result<bool> {
        let current = fs::read_to_string(path)
            .with_context(|| format!("failed to read configuration: {path:?}"))?;
        let complete =
            toml::to_string_pretty(self).context("failed to serialize configuration")?;
        if current == complete {
            return Ok(false);
        }

        fs::write(path, complete)
            .with_context(|| format!("failed to write configuration: {path:?}"))?;
        Ok(true)
    }

    pub fn validate(&self) -> Result<()> {
        let m = &self.measurement;
        if m.take_measurements_for == 0 {
            bail!("measurement.take_measurements_for must be greater than 0");
        }
        if m.ignore_first_x_measurements >= m.take_measurements_for {
            bail!(
                "measurement.ignore_first_x_measurements ({}) must be less than measurement.take_measurements_for ({})",
                m.ignore_first_x_measurements,
                m.take_measurements_for
            );
        }
        if m.wait_between_measurements == 0 && m.poll_interval_ms == 0 {
            bail!("measurement.poll_interval_ms must be greater than 0 when polling");
        }
        if self.sensor.command_timeout_secs == 0 {
            bail!("sensor.command_timeout_secs must be greater than 0");
        }
        if self.sensor_community.enabled && self.sensor_community.sensor_node_id.is_empty() {
            bail!("sensor_community.sensor_node_id is required when sensor_community is enabled");
        }
        Ok(())
    }

    pub fn cycle(&self) -> CycleConfig {
        let m = &self.measurement;
        let base_delay = Duration::from_millis(self.retry.base_delay_ms);

        CycleConfig {
            primary: self.sensor.operation_mode.main,
            secondary: self.sensor.operation_mode.secondary,
            force_clean_fan: self.sensor.force_clean_fan,
            warm_up_count: m.ignore_first_x_measurements,
            sample_count: m.take_measurements_for,
            wait: if m.wait_between_measurements == 0 {
                WaitPolicy::PollDataReady(Duration::from_millis(m.poll_interval_ms))
            } else {
                WaitPolicy::Fixed(Duration::from_secs(m.wait_between_measurements))
            },
            sleep_between_batches: Duration::from_secs(m.sleep_until_next_batch),
            command_timeout: Duration::from_secs(self.sensor.command_timeout_secs),
            read_retry: RetryPolicy {
                attempts: self.retry.read_attempts,
                base_delay,
            },
            dispatch_retry: RetryPolicy {
                attempts: self.retry.dispatch_attempts,
                base_delay,
            },
            device_settings: DeviceSettings {
                fan_cleaning_interval: self.sensor.fan_cleaning_interval,
                rht_acceleration_mode: self.sensor.rht_acceleration_mode,
                temperature_offset: self.sensor.temperature_offset,
            },
        }
    }
}

/// How the orchestrator waits for the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    Fixed(Duration),
    /// Poll the data-ready flag at this interval.
    PollDataReady(Duration),
}

/// Settings written to the device once at startup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceSettings {
    pub fan_cleaning_interval: u32,
    pub rht_acceleration_mode: u16,
    pub temperature_offset: f32,
}

/// Everything the measurement cycle reads, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfig {
    pub primary: PrimaryMode,
    pub secondary: SecondaryMode,
    pub force_clean_fan: bool,
    pub warm_up_count: u32,
    pub sample_count: u32,
    pub wait: WaitPolicy,
    pub sleep_between_batches: Duration,
    pub command_timeout: Duration,
    pub read_retry: RetryPolicy,
    pub dispatch_retry: RetryPolicy,
    pub device_settings: DeviceSettings,
}

/// Appends `.csv` unless the name already ends with it.
pub fn csv_file_name(name: &str) -> PathBuf {
    if name.ends_with(".csv") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{name}.csv"))
    }
}
