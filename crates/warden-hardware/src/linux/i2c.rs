//! I2C through `/dev/i2c-N`.

use crate::error::{HardwareError, Result};
use crate::traits::I2cBus;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::path::Path;

/// `ioctl` request binding the file descriptor to a slave address.
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// An i2c-dev file bound to one slave address.
#[derive(Debug)]
pub struct LinuxI2c {
    file: File,
    address: u16,
}

impl LinuxI2c {
    pub fn open(bus: &Path, address: u16) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus)
            .map_err(|e| HardwareError::unavailable(format!("{}: {e}", bus.display())))?;

        // SAFETY: valid open descriptor; I2C_SLAVE takes the address by value.
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(HardwareError::initialization_failed(format!(
                "I2C_SLAVE {address:#04x} on {}: {}",
                bus.display(),
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self { file, address })
    }

    pub fn address(&self) -> u16 {
        self.address
    }
}

impl I2cBus for LinuxI2c {
    fn write_register(&mut self, register: u8, data: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(1 + data.len());
        frame.push(register);
        frame.extend_from_slice(data);
        self.file
            .write_all(&frame)
            .map_err(|e| HardwareError::communication(format!("i2c write: {e}")))
    }

    fn read_register(&mut self, register: u8, buf: &mut [u8]) -> Result<()> {
        self.file
            .write_all(&[register])
            .map_err(|e| HardwareError::communication(format!("i2c write: {e}")))?;
        self.read_raw(buf)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact(buf)
            .map_err(|e| HardwareError::communication(format!("i2c read: {e}")))
    }
}
