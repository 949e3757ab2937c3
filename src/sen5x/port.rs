use std::{fmt, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{task, time};

use crate::sen5x::SensorMeasurement;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device I/O failed: {0}")]
    Io(String),

    #[error("device did not answer within {0:?}")]
    Timeout(Duration),

    #[error("device call aborted: {0}")]
    Join(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub hardware_major: u8,
    pub hardware_minor: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware {}.{}, hardware {}.{}",
            self.firmware_major, self.firmware_minor, self.hardware_major, self.hardware_minor
        )
    }
}

/// Identity read from the device at startup.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub serial_number: String,
    pub product_name: String,
    pub firmware: FirmwareVersion,
}

/// Command set of a SEN5x device link.
///
/// Implementations own the bus and must serialize access internally: `stop` may be called
/// from the shutdown path while a `read_sample` is in flight on another thread.
pub trait SensorPort: Send + Sync + 'static {
    /// Device Reset (0xD304)
    fn reset(&self) -> Result<(), DeviceError>;

    /// Read Serial Number (0xD033)
    fn serial_number(&self) -> Result<String, DeviceError>;

    /// Read Product Name (0xD014)
    fn product_name(&self) -> Result<String, DeviceError>;

    /// Read Firmware Version (0xD100)
    fn firmware_version(&self) -> Result<FirmwareVersion, DeviceError>;

    /// Write Fan Cleaning Interval (0x5603)
    fn set_fan_cleaning_interval(&self, seconds: u32) -> Result<(), DeviceError>;

    /// Write RH/T Acceleration Mode (0x60F7)
    fn set_rht_acceleration_mode(&self, mode: u16) -> Result<(), DeviceError>;

    /// Write Temperature Compensation Parameters (0x60B2), offset only.
    fn set_temperature_offset(&self, celsius: f32) -> Result<(), DeviceError>;

    /// Start Measurement (0x0021)
    fn start_full(&self) -> Result<(), DeviceError>;

    /// Start Measurement in RHT/Gas-Only Measurement Mode (0x0037)
    fn start_gas_only(&self) -> Result<(), DeviceError>;

    /// Stop Measurement (0x0104)
    fn stop(&self) -> Result<(), DeviceError>;

    /// Start Fan Cleaning (0x5607)
    fn start_cleaning(&self) -> Result<(), DeviceError>;

    /// Read Data-Ready Flag (0x0202)
    fn data_ready(&self) -> Result<bool, DeviceError>;

    /// Read Measured Values (0x03C4)
    fn read_sample(&self) -> Result<SensorMeasurement, DeviceError>;
}

/// Runs one blocking port call on the blocking pool, giving up after `timeout`.
///
/// On expiry the call keeps running on its thread; the caller only stops waiting for it.
pub async fn call<P, T, F>(port: &Arc<P>, timeout: Duration, f: F) -> Result<T, DeviceError>
where
    P: SensorPort,
    T: Send + 'static,
    F: FnOnce(&P) -> Result<T, DeviceError> + Send + 'static,
{
    let port = Arc::clone(port);
    let handle = task::spawn_blocking(move || f(&port));

    match time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(DeviceError::Join(e.to_string())),
        Err(_) => Err(DeviceError::Timeout(timeout)),
    }
}

/// Resets the device and reads its identity.
pub async fn identify<P: SensorPort>(
    port: &Arc<P>,
    timeout: Duration,
) -> Result<DeviceInfo, DeviceError> {
    call(port, timeout, |p| p.reset()).await?;

    let serial_number = call(port, timeout, |p| p.serial_number()).await?;
    let product_name = call(port, timeout, |p| p.product_name()).await?;
    let firmware = call(port, timeout, |p| p.firmware_version()).await?;

    Ok(DeviceInfo {
        serial_number,
        product_name,
        firmware,
    })
}
