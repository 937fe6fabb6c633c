//! Linux drivers: sysfs GPIO and PWM, i2c-dev, and TTY serial ports.

pub mod gpio;
pub mod i2c;
pub mod pwm;
pub mod serial;

pub use gpio::SysfsGpio;
pub use i2c::LinuxI2c;
pub use pwm::SysfsPwm;
pub use serial::SerialUart;
