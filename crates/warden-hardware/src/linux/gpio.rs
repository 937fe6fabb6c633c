//! GPIO lines through the sysfs interface.

use crate::error::{HardwareError, Result};
use crate::traits::{InputPin, OutputPin};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default sysfs GPIO root.
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Direction requested when a line is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// One exported GPIO line with its value file held open.
#[derive(Debug)]
pub struct SysfsGpio {
    line: u32,
    value: File,
}

impl SysfsGpio {
    /// Open `line` as an output, driven low.
    pub fn output(line: u32) -> Result<Self> {
        let mut pin = Self::open_at(Path::new(SYSFS_GPIO_ROOT), line, Direction::Out)?;
        pin.write(false)?;
        Ok(pin)
    }

    /// Open `line` as an input.
    pub fn input(line: u32) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_GPIO_ROOT), line, Direction::In)
    }

    /// Export (if needed), set direction and open the value file under `root`.
    pub fn open_at(root: &Path, line: u32, direction: Direction) -> Result<Self> {
        let dir = root.join(format!("gpio{line}"));
        if !dir.exists() {
            debug!(line, "exporting GPIO line");
            fs::write(root.join("export"), line.to_string())
                .map_err(|e| HardwareError::unavailable(format!("gpio{line}: {e}")))?;
        }
        fs::write(dir.join("direction"), direction.as_str())?;
        let value = OpenOptions::new()
            .read(true)
            .write(direction == Direction::Out)
            .open(value_path(&dir))?;
        Ok(Self { line, value })
    }

    /// Line number.
    pub fn line(&self) -> u32 {
        self.line
    }
}

fn value_path(dir: &Path) -> PathBuf {
    dir.join("value")
}

impl OutputPin for SysfsGpio {
    fn write(&mut self, high: bool) -> Result<()> {
        self.value.seek(SeekFrom::Start(0))?;
        self.value.write_all(if high { b"1" } else { b"0" })?;
        Ok(())
    }
}

impl InputPin for SysfsGpio {
    fn read(&mut self) -> Result<bool> {
        let mut buf = [0u8; 1];
        self.value.seek(SeekFrom::Start(0))?;
        self.value.read_exact(&mut buf)?;
        match buf[0] {
            b'0' => Ok(false),
            b'1' => Ok(true),
            other => Err(HardwareError::invalid_data(format!(
                "gpio{} value byte {other:#04x}",
                self.line
            ))),
        }
    }
}
