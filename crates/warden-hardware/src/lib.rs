//! Hardware abstraction layer for the Warden appliance.
//!
//! # Layers
//!
//! - [`traits`]: object-safe, synchronous contracts for GPIO lines, serial
//!   ports, I2C and PWM, plus the [`Sensor`] trait implemented by the
//!   readers in `warden-rfid` and `warden-biometric`
//! - [`linux`]: sysfs, i2c-dev and TTY implementations
//! - [`mock`]: scriptable stand-ins with shared handles for tests
//! - [`actuators`] and [`climate`]: device logic built on the contracts
//! - [`peripherals`]: the full device set opened from configuration
//!
//! # Example
//!
//! ```
//! use warden_hardware::climate::ClimateSensor;
//! use warden_hardware::mock::MockI2c;
//! use warden_hardware::Sensor;
//!
//! let (bus, handle) = MockI2c::new();
//! handle.set_raw_response(&[0x1C, 0x80, 0x00, 0x08, 0x00, 0x00, 0x00]);
//!
//! let mut sensor = ClimateSensor::new(Box::new(bus))
//!     .with_measurement_delay(std::time::Duration::ZERO);
//! let reading = sensor.read().unwrap();
//! assert!((reading.humidity - 50.0).abs() < 0.01);
//! ```

pub mod actuators;
pub mod climate;
pub mod error;
pub mod linux;
pub mod mock;
pub mod peripherals;
pub mod traits;

pub use actuators::{Actuator, ActuatorBank};
pub use climate::{ClimateReading, ClimateSensor};
pub use error::{HardwareError, Result};
pub use peripherals::{MockPeripherals, Peripherals};
pub use traits::{
    BoxedI2cBus, BoxedInputPin, BoxedOutputPin, BoxedPwmChannel, BoxedUart, I2cBus, InputPin,
    OutputPin, PwmChannel, Sensor, Uart, UartSettings,
};
