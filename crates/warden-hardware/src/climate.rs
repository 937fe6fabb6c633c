//! AHT20 temperature and humidity sensor on I2C.

use crate::error::{HardwareError, Result};
use crate::traits::{BoxedI2cBus, Sensor};
use std::thread;
use std::time::Duration;

/// Default 7-bit address.
pub const AHT20_ADDRESS: u16 = 0x38;

const CMD_INITIALIZE: u8 = 0xBE;
const CMD_TRIGGER: u8 = 0xAC;
const STATUS_BUSY: u8 = 0x80;
const STATUS_CALIBRATED: u8 = 0x08;
const FULL_SCALE: f32 = (1u32 << 20) as f32;

/// Conversion time after a measurement trigger.
pub const MEASUREMENT_DELAY: Duration = Duration::from_millis(80);

/// One sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
}

/// Convert a raw 7-byte measurement frame.
///
/// ```
/// use warden_hardware::climate::decode_measurement;
///
/// // Half scale on both channels: 50 %RH and 50 degC.
/// let frame = [0x1C, 0x80, 0x00, 0x08, 0x00, 0x00, 0x00];
/// let reading = decode_measurement(&frame).unwrap();
/// assert!((reading.humidity - 50.0).abs() < 0.01);
/// assert!((reading.temperature - 50.0).abs() < 0.01);
/// ```
pub fn decode_measurement(frame: &[u8; 7]) -> Result<ClimateReading> {
    if frame[0] & STATUS_BUSY != 0 {
        return Err(HardwareError::communication("AHT20 still busy"));
    }
    let raw_humidity =
        (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
    let raw_temperature =
        ((u32::from(frame[3]) & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);
    Ok(ClimateReading {
        humidity: raw_humidity as f32 / FULL_SCALE * 100.0,
        temperature: raw_temperature as f32 / FULL_SCALE * 200.0 - 50.0,
    })
}

pub struct ClimateSensor {
    bus: BoxedI2cBus,
    measurement_delay: Duration,
}

impl ClimateSensor {
    pub fn new(bus: BoxedI2cBus) -> Self {
        Self {
            bus,
            measurement_delay: MEASUREMENT_DELAY,
        }
    }

    /// Override the conversion wait (tests use zero).
    #[must_use]
    pub fn with_measurement_delay(mut self, delay: Duration) -> Self {
        self.measurement_delay = delay;
        self
    }
}

impl Sensor for ClimateSensor {
    type Reading = ClimateReading;

    /// Calibrate if the status byte reports an uncalibrated device.
    fn init(&mut self) -> Result<()> {
        let mut status = [0u8; 1];
        self.bus.read_raw(&mut status)?;
        if status[0] & STATUS_CALIBRATED == 0 {
            self.bus.write_register(CMD_INITIALIZE, &[0x08, 0x00])?;
            thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }

    fn read(&mut self) -> Result<ClimateReading> {
        self.bus.write_register(CMD_TRIGGER, &[0x33, 0x00])?;
        thread::sleep(self.measurement_delay);
        let mut frame = [0u8; 7];
        self.bus.read_raw(&mut frame)?;
        decode_measurement(&frame)
    }
}
