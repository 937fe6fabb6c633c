//! TTY serial ports via `serialport`.

use crate::error::{HardwareError, Result};
use crate::traits::{Parity, Uart, UartSettings};
use serialport::{ClearBuffer, DataBits, SerialPort, TTYPort};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::debug;

/// A non-blocking TTY.
///
/// The port timeout is zero so reads and writes return immediately;
/// [`Uart::wait_readable`] polls the descriptor.
pub struct SerialUart {
    path: String,
    port: TTYPort,
}

impl std::fmt::Debug for SerialUart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialUart").field("path", &self.path).finish()
    }
}

fn data_bits(bits: u8) -> Result<DataBits> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(HardwareError::out_of_range(format!("{other} data bits"))),
    }
}

fn parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

impl SerialUart {
    /// Open `path` with `settings`.
    pub fn open(path: &str, settings: UartSettings) -> Result<Self> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits)?)
            .parity(parity(settings.parity))
            .timeout(Duration::ZERO)
            .open_native()?;
        debug!(path, baud = settings.baud_rate, "serial port opened");
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Uart for SerialUart {
    fn configure(&mut self, settings: UartSettings) -> Result<()> {
        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(data_bits(settings.data_bits)?)?;
        self.port.set_parity(parity(settings.parity))?;
        Ok(())
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_buffer(&mut self, data: &[u8]) -> Result<usize> {
        match self.port.write(data) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool> {
        let mut fds = libc::pollfd {
            fd: self.port.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        // SAFETY: one valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut fds, 1, millis) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err.into());
        }
        if fds.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(HardwareError::unavailable(self.path.clone()));
        }
        Ok(rc > 0 && fds.revents & libc::POLLIN != 0)
    }

    fn flush_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
