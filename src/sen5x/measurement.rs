use std::fmt;

/// Raw channel value a SEN5x reports for a quantity the connected variant does not measure.
pub const UNSUPPORTED_RAW: i32 = i32::MIN;

/// Mass concentration the device reports when it is not measuring particulates, the raw
/// `0xFFFF` scaled to µg/m³. The sensor's range ends at 1000 µg/m³.
pub const UNKNOWN_PM: u32 = 0xFFFF / 10;

/// One reading of all eight SEN5x channels, truncated to integers.
///
/// Mass concentrations are measured by every variant but are `None` while the device runs
/// without particulate measurement. The environmental channels are `None` when the connected
/// variant has no sensor for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorMeasurement {
    /// PM1.0 [µg/m³]
    pub pm1_0: Option<u32>,

    /// PM2.5 [µg/m³]
    pub pm2_5: Option<u32>,

    /// PM4.0 [µg/m³]
    pub pm4_0: Option<u32>,

    /// PM10.0 [µg/m³]
    pub pm10_0: Option<u32>,

    /// Compensated ambient humidity [%RH]
    pub humidity: Option<i32>,

    /// Compensated ambient temperature [°C]
    pub temperature: Option<i32>,

    pub voc_index: Option<i32>,

    pub nox_index: Option<i32>,
}

impl SensorMeasurement {
    /// Builds a measurement from raw driver values, mapping [`UNKNOWN_PM`] and
    /// [`UNSUPPORTED_RAW`] to `None`.
    pub fn from_raw(pm: [u32; 4], environment: [i32; 4]) -> Self {
        let [pm1_0, pm2_5, pm4_0, pm10_0] = pm.map(decode_pm);
        let [humidity, temperature, voc_index, nox_index] = environment.map(decode_channel);

        Self {
            pm1_0,
            pm2_5,
            pm4_0,
            pm10_0,
            humidity,
            temperature,
            voc_index,
            nox_index,
        }
    }

    /// Clears the mass concentrations, for samples taken without particulate measurement.
    pub fn without_particulates(self) -> Self {
        Self {
            pm1_0: None,
            pm2_5: None,
            pm4_0: None,
            pm10_0: None,
            ..self
        }
    }

    pub fn has_particulates(&self) -> bool {
        self.pm2_5.is_some() && self.pm10_0.is_some()
    }
}

pub fn decode_pm(raw: u32) -> Option<u32> {
    if raw >= UNKNOWN_PM { None } else { Some(raw) }
}

pub fn decode_channel(raw: i32) -> Option<i32> {
    if raw == UNSUPPORTED_RAW {
        None
    } else {
        Some(raw)
    }
}

impl fmt::Display for SensorMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pm1.0={} pm2.5={} pm4.0={} pm10.0={} hum={} temp={} voc={} nox={}",
            Optional(self.pm1_0),
            Optional(self.pm2_5),
            Optional(self.pm4_0),
            Optional(self.pm10_0),
            Optional(self.humidity),
            Optional(self.temperature),
            Optional(self.voc_index),
            Optional(self.nox_index),
        )
    }
}

struct Optional<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for Optional<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("n/a"),
        }
    }
}

/// Mean of one cycle's kept samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AveragedMeasurement {
    pub values: SensorMeasurement,

    /// Number of samples that went into the mean.
    pub sample_count: usize,
}
