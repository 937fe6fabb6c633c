//! Mock peripherals for tests and bench runs without hardware.
//!
//! Each mock is returned together with a cloneable handle that shares its
//! state, so a test can hand the device to a worker and still inspect or
//! drive it.

pub mod i2c;
pub mod pin;
pub mod pwm;
pub mod uart;

pub use i2c::{MockI2c, MockI2cHandle};
pub use pin::{MockInputPin, MockInputPinHandle, MockOutputPin, MockOutputPinHandle};
pub use pwm::{MockPwm, MockPwmHandle};
pub use uart::{MockUart, MockUartHandle};
