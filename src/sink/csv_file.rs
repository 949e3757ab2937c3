use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
    sync::Mutex,
};

use csv::{Terminator, Writer, WriterBuilder};
use serde::Serialize;

use crate::{
    sen5x::AveragedMeasurement,
    sink::{Sink, SinkError},
};

/// One line of the data log:
/// `unixTimestamp,PM1_0,PM2_5,PM4_0,PM10_0,Hum,Temp,VOC,NOx`. Channels without a value are
/// empty.
#[derive(Debug, Serialize)]
struct Record {
    timestamp: i64,
    pm1_0: Option<u32>,
    pm2_5: Option<u32>,
    pm4_0: Option<u32>,
    pm10_0: Option<u32>,
    humidity: Option<i32>,
    temperature: Option<i32>,
    voc_index: Option<i32>,
    nox_index: Option<i32>,
}

impl Record {
    fn new(timestamp: i64, reading: &AveragedMeasurement) -> Self {
        let v = &reading.values;
        Self {
            timestamp,
            pm1_0: v.pm1_0,
            pm2_5: v.pm2_5,
            pm4_0: v.pm4_0,
            pm10_0: v.pm10_0,
            humidity: v.humidity,
            temperature: v.temperature,
            voc_index: v.voc_index,
            nox_index: v.nox_index,
        }
    }
}

/// Appends one CSV line per cycle to a file that is never truncated.
#[derive(Debug)]
pub struct CsvFileSink {
    path: PathBuf,
    writer: Mutex<Writer<File>>,
}

impl CsvFileSink {
    pub fn open(path: &Path) -> Result<Self, SinkError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let writer = WriterBuilder::new()
            .has_headers(false)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Sink for CsvFileSink {
    fn name(&self) -> &'static str {
        "csv file"
    }

    fn dispatch(&self, timestamp: i64, reading: &AveragedMeasurement) -> Result<(), SinkError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| SinkError::Io(std::io::Error::other("csv writer poisoned")))?;

        writer.serialize(Record::new(timestamp, reading))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::sen5x::SensorMeasurement;

    fn reading(pm: u32, nox_index: Option<i32>) -> AveragedMeasurement {
        AveragedMeasurement {
            values: SensorMeasurement {
                pm1_0: Some(pm),
                pm2_5: Some(pm + 1),
                pm4_0: Some(pm + 2),
                pm10_0: Some(pm + 3),
                humidity: Some(45),
                temperature: Some(-4),
                voc_index: Some(102),
                nox_index,
            },
            sample_count: 3,
        }
    }

    #[test]
    fn writes_one_headerless_line_per_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        let sink = CsvFileSink::open(&path).unwrap();
        sink.dispatch(1_700_000_000, &reading(10, Some(1))).unwrap();
        sink.dispatch(1_700_000_300, &reading(20, None)).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "1700000000,10,11,12,13,45,-4,102,1\n1700000300,20,21,22,23,45,-4,102,\n"
        );
    }

    #[test]
    fn particulates_not_measured_are_empty_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut r = reading(10, Some(1));
        r.values = r.values.without_particulates();

        let sink = CsvFileSink::open(&path).unwrap();
        sink.dispatch(1_700_000_000, &r).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "1700000000,,,,,45,-4,102,1\n"
        );
    }

    #[test]
    fn reopening_appends_instead_of_truncating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        fs::write(&path, "1,0,0,0,0,0,0,0,0\n").unwrap();

        let sink = CsvFileSink::open(&path).unwrap();
        sink.dispatch(2, &reading(5, Some(3))).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("1,0,0,0,0,0,0,0,0\n2,5,"));
    }
}
