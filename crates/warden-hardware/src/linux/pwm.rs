//! PWM channels through the sysfs interface. Times are written in nanoseconds.

use crate::error::{HardwareError, Result};
use crate::traits::PwmChannel;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default sysfs PWM root.
pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

#[derive(Debug)]
pub struct SysfsPwm {
    dir: PathBuf,
}

impl SysfsPwm {
    /// Open `pwmchip{chip}/pwm{channel}`, exporting it if needed.
    pub fn open(chip: u32, channel: u32) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_PWM_ROOT), chip, channel)
    }

    pub fn open_at(root: &Path, chip: u32, channel: u32) -> Result<Self> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        let dir = chip_dir.join(format!("pwm{channel}"));
        if !dir.exists() {
            fs::write(chip_dir.join("export"), channel.to_string()).map_err(|e| {
                HardwareError::unavailable(format!("pwmchip{chip}/pwm{channel}: {e}"))
            })?;
        }
        Ok(Self { dir })
    }

    fn write_attr(&self, name: &str, value: impl ToString) -> Result<()> {
        fs::write(self.dir.join(name), value.to_string())?;
        Ok(())
    }
}

impl PwmChannel for SysfsPwm {
    fn set_period(&mut self, period: Duration) -> Result<()> {
        self.write_attr("period", period.as_nanos())
    }

    fn set_duty_cycle(&mut self, duty: Duration) -> Result<()> {
        self.write_attr("duty_cycle", duty.as_nanos())
    }

    fn enable(&mut self, enabled: bool) -> Result<()> {
        self.write_attr("enable", u8::from(enabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_written_in_nanoseconds() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("pwmchip0/pwm1");
        fs::create_dir_all(&dir).unwrap();

        let mut pwm = SysfsPwm::open_at(root.path(), 0, 1).unwrap();
        pwm.set_period(Duration::from_millis(20)).unwrap();
        pwm.set_duty_cycle(Duration::from_micros(1500)).unwrap();
        pwm.enable(true).unwrap();

        assert_eq!(fs::read_to_string(dir.join("period")).unwrap(), "20000000");
        assert_eq!(fs::read_to_string(dir.join("duty_cycle")).unwrap(), "1500000");
        assert_eq!(fs::read_to_string(dir.join("enable")).unwrap(), "1");
    }
}
