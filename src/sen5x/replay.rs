use std::{
    fs::File,
    io::Read,
    path::Path,
    sync::{Mutex, MutexGuard},
};

use anyhow::{Context as _, Result, bail};
use csv::{Reader, StringRecord};

use crate::sen5x::{
    DeviceError, FirmwareVersion, SensorMeasurement, SensorPort, decode_channel, decode_pm,
};

const PM1_0_INDEX: usize = 0;
const PM2_5_INDEX: usize = 1;
const PM4_0_INDEX: usize = 2;
const PM10_0_INDEX: usize = 3;
const HUMIDITY_INDEX: usize = 4;
const TEMPERATURE_INDEX: usize = 5;
const VOC_INDEX_INDEX: usize = 6;
const NOX_INDEX_INDEX: usize = 7;

const REPLAY_SERIAL_NUMBER: &str = "REPLAY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    Full,
    GasOnly,
}

#[derive(Debug)]
struct State {
    mode: Mode,
    cursor: usize,
}

/// A [`SensorPort`] that serves recorded samples instead of talking to hardware.
///
/// The input is a CSV file with the header
/// `pm1_0,pm2_5,pm4_0,pm10_0,humidity,temperature,voc_index,nox_index`; an empty field means
/// the channel is not measured. Samples are served in order and wrap around. In gas-only mode
/// the particulate channels read as unknown, like on the device.
#[derive(Debug)]
pub struct ReplayPort {
    samples: Vec<SensorMeasurement>,
    product_name: String,
    state: Mutex<State>,
}

impl ReplayPort {
    pub fn new(samples: Vec<SensorMeasurement>, product_name: impl Into<String>) -> Result<Self> {
        if samples.is_empty() {
            bail!("replay needs at least one sample");
        }

        Ok(Self {
            samples,
            product_name: product_name.into(),
            state: Mutex::new(State {
                mode: Mode::Idle,
                cursor: 0,
            }),
        })
    }

    pub fn from_path(path: &Path, product_name: impl Into<String>) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open file: {path:?}"))?;
        Self::from_reader(file, product_name)
            .with_context(|| format!("failed to load replay samples: {path:?}"))
    }

    pub fn from_reader<R: Read>(reader: R, product_name: impl Into<String>) -> Result<Self> {
        let mut reader = Reader::from_reader(reader);

        let samples = reader
            .records()
            .enumerate()
            .map(|(i, row)| {
                let row = row.with_context(|| format!("failed to read CSV row {}", i + 1))?;
                parse_row(&row).with_context(|| format!("failed to parse CSV row {}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(samples, product_name)
    }

    fn set_mode(&self, mode: Mode) -> Result<(), DeviceError> {
        self.lock()?.mode = mode;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, DeviceError> {
        self.state
            .lock()
            .map_err(|_| DeviceError::Io("replay state poisoned".to_string()))
    }
}

impl SensorPort for ReplayPort {
    fn reset(&self) -> Result<(), DeviceError> {
        let mut state = self.lock()?;
        state.mode = Mode::Idle;
        state.cursor = 0;
        Ok(())
    }

    fn serial_number(&self) -> Result<String, DeviceError> {
        Ok(REPLAY_SERIAL_NUMBER.to_string())
    }

    fn product_name(&self) -> Result<String, DeviceError> {
        Ok(self.product_name.clone())
    }

    fn firmware_version(&self) -> Result<FirmwareVersion, DeviceError> {
        Ok(FirmwareVersion {
            firmware_major: 0,
            firmware_minor: 0,
            hardware_major: 0,
            hardware_minor: 0,
        })
    }

    fn set_fan_cleaning_interval(&self, _seconds: u32) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_rht_acceleration_mode(&self, _mode: u16) -> Result<(), DeviceError> {
        Ok(())
    }

    fn set_temperature_offset(&self, _celsius: f32) -> Result<(), DeviceError> {
        Ok(())
    }

    fn start_full(&self) -> Result<(), DeviceError> {
        self.set_mode(Mode::Full)
    }

    fn start_gas_only(&self) -> Result<(), DeviceError> {
        self.set_mode(Mode::GasOnly)
    }

    fn stop(&self) -> Result<(), DeviceError> {
        self.set_mode(Mode::Idle)
    }

    fn start_cleaning(&self) -> Result<(), DeviceError> {
        let state = self.lock()?;
        if state.mode != Mode::Full {
            return Err(DeviceError::Io(
                "fan cleaning requires measurement mode".to_string(),
            ));
        }
        Ok(())
    }

    fn data_ready(&self) -> Result<bool, DeviceError> {
        Ok(self.lock()?.mode != Mode::Idle)
    }

    fn read_sample(&self) -> Result<SensorMeasurement, DeviceError> {
        let mut state = self.lock()?;
        if state.mode == Mode::Idle {
            return Err(DeviceError::Io("measurement is not running".to_string()));
        }

        let sample = self.samples[state.cursor];
        state.cursor = (state.cursor + 1) % self.samples.len();

        match state.mode {
            Mode::Idle | Mode::Full => Ok(sample),
            Mode::GasOnly => Ok(sample.without_particulates()),
        }
    }
}

fn parse_row(row: &StringRecord) -> Result<SensorMeasurement> {
    Ok(SensorMeasurement {
        pm1_0: parse_pm(row, PM1_0_INDEX)?,
        pm2_5: parse_pm(row, PM2_5_INDEX)?,
        pm4_0: parse_pm(row, PM4_0_INDEX)?,
        pm10_0: parse_pm(row, PM10_0_INDEX)?,
        humidity: parse_optional(row, HUMIDITY_INDEX)?,
        temperature: parse_optional(row, TEMPERATURE_INDEX)?,
        voc_index: parse_optional(row, VOC_INDEX_INDEX)?,
        nox_index: parse_optional(row, NOX_INDEX_INDEX)?,
    })
}

fn parse_pm(row: &StringRecord, index: usize) -> Result<Option<u32>> {
    let field = field(row, index)?;
    if field.is_empty() {
        return Ok(None);
    }

    let v: u32 = field
        .parse()
        .with_context(|| format!("failed to parse particulate value: {field}"))?;
    Ok(decode_pm(v))
}

fn parse_optional(row: &StringRecord, index: usize) -> Result<Option<i32>> {
    let field = field(row, index)?;
    if field.is_empty() {
        return Ok(None);
    }

    let v: i32 = field
        .parse()
        .with_context(|| format!("failed to parse value: {field}"))?;
    Ok(decode_channel(v))
}

fn field(row: &StringRecord, index: usize) -> Result<&str> {
    match row.get(index) {
        Some(f) => Ok(f.trim()),
        None => bail!("missing column {index}: expected 8 columns, got {}", row.len()),
    }
}
