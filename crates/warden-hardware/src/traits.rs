//! Peripheral interfaces consumed by the workers.
//!
//! Every trait is synchronous and object-safe so workers can hold
//! `Box<dyn Trait + Send>` and tests can substitute the mocks in
//! [`crate::mock`]. Linux implementations live in [`crate::linux`].

use crate::error::Result;
use std::time::Duration;

/// Digital output line.
pub trait OutputPin: Send {
    /// Drive the line high (`true`) or low (`false`).
    fn write(&mut self, high: bool) -> Result<()>;
}

/// Digital input line.
pub trait InputPin: Send {
    /// Current line level.
    fn read(&mut self) -> Result<bool>;
}

/// Serial parity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

/// Serial line settings applied by [`Uart::configure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartSettings {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
}

impl UartSettings {
    /// 8N1 at `baud_rate`.
    ///
    /// ```
    /// use warden_hardware::traits::{Parity, UartSettings};
    ///
    /// let s = UartSettings::eight_n_one(9600);
    /// assert_eq!(s.data_bits, 8);
    /// assert_eq!(s.parity, Parity::None);
    /// ```
    #[must_use]
    pub const fn eight_n_one(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: Parity::None,
        }
    }
}

/// Byte-oriented serial port.
///
/// `read_buffer` and `write_buffer` never block; they return how many bytes
/// were transferred, which may be zero.
pub trait Uart: Send {
    /// Apply line settings.
    fn configure(&mut self, settings: UartSettings) -> Result<()>;

    /// Read whatever is available into `buf`.
    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Queue as much of `data` as the driver accepts.
    fn write_buffer(&mut self, data: &[u8]) -> Result<usize>;

    /// Block until at least one byte is readable or `timeout` passes.
    ///
    /// Returns `true` when data is available.
    fn wait_readable(&mut self, timeout: Duration) -> Result<bool>;

    /// Discard unread input.
    fn flush_input(&mut self) -> Result<()>;

    /// Write all of `data`, retrying short writes.
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            let n = self.write_buffer(&data[written..])?;
            if n == 0 {
                return Err(crate::HardwareError::communication(format!(
                    "UART accepted 0 of {} remaining bytes",
                    data.len() - written
                )));
            }
            written += n;
        }
        Ok(())
    }
}

/// I2C bus bound to one slave address.
pub trait I2cBus: Send {
    /// Write `data` after a register/command byte.
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<()>;

    /// Write a register byte, then read `buf.len()` bytes.
    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<()>;

    /// Plain read without a register write.
    fn read_raw(&mut self, buf: &mut [u8]) -> Result<()>;
}

/// PWM output channel.
pub trait PwmChannel: Send {
    fn set_period(&mut self, period: Duration) -> Result<()>;

    fn set_duty_cycle(&mut self, duty: Duration) -> Result<()>;

    fn enable(&mut self, enabled: bool) -> Result<()>;
}

/// A polled input device owned by exactly one worker.
///
/// Errors from `read` are transient: the worker logs them and waits for the
/// next trigger.
pub trait Sensor: Send {
    type Reading;

    fn init(&mut self) -> Result<()>;

    fn read(&mut self) -> Result<Self::Reading>;
}

/// A boxed output pin, the form workers hold.
pub type BoxedOutputPin = Box<dyn OutputPin>;

/// A boxed input pin.
pub type BoxedInputPin = Box<dyn InputPin>;

/// A boxed serial port.
pub type BoxedUart = Box<dyn Uart>;

/// A boxed I2C bus.
pub type BoxedI2cBus = Box<dyn I2cBus>;

/// A boxed PWM channel.
pub type BoxedPwmChannel = Box<dyn PwmChannel>;
