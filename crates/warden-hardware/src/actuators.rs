//! Output devices driven by the actuator executor.
//!
//! [`Actuator`] is a closed set: two door servos, the fan and the alarm. An
//! [`ActuatorBank`] holds one of each, indexed by [`ActuatorId`], and is
//! owned by a single thread.
//!
//! # Example
//!
//! ```
//! use warden_core::ActuatorId;
//! use warden_hardware::actuators::{ActuatorBank, Alarm, Fan, Servo};
//! use warden_hardware::mock::{MockOutputPin, MockPwm};
//!
//! let (room, _) = MockPwm::new();
//! let (vault, _) = MockPwm::new();
//! let (fan, _) = MockOutputPin::new();
//! let (led, led_handle) = MockOutputPin::new();
//! let (buzzer, _) = MockOutputPin::new();
//!
//! let mut bank = ActuatorBank::new(
//!     Servo::new(Box::new(room)),
//!     Servo::new(Box::new(vault)),
//!     Fan::new(Box::new(fan)),
//!     Alarm::new(Box::new(led), Box::new(buzzer)),
//! );
//! bank.init_all().unwrap();
//! bank.get_mut(ActuatorId::Alarm).set_value(1).unwrap();
//! assert_eq!(led_handle.level(), Some(true));
//! ```

use crate::error::Result;
use crate::traits::{BoxedOutputPin, BoxedPwmChannel};
use std::time::Duration;
use tracing::warn;
use warden_core::ActuatorId;
use warden_core::constants::SERVO_CLOSED_ANGLE;

/// Servo PWM period.
pub const SERVO_PERIOD: Duration = Duration::from_millis(20);

const SERVO_MIN_PULSE_US: u64 = 500;
const SERVO_RANGE_US: u64 = 2000;
const SERVO_MAX_ANGLE: u8 = 180;

/// Pulse width for `angle` degrees, clamped to 0..=180.
///
/// ```
/// use std::time::Duration;
/// use warden_hardware::actuators::servo_pulse;
///
/// assert_eq!(servo_pulse(0), Duration::from_micros(500));
/// assert_eq!(servo_pulse(90), Duration::from_micros(1500));
/// assert_eq!(servo_pulse(255), Duration::from_micros(2500));
/// ```
#[must_use]
pub fn servo_pulse(angle: u8) -> Duration {
    let angle = u64::from(angle.min(SERVO_MAX_ANGLE));
    Duration::from_micros(SERVO_MIN_PULSE_US + angle * SERVO_RANGE_US / u64::from(SERVO_MAX_ANGLE))
}

/// Hobby servo on a PWM channel. Value is the angle in degrees.
pub struct Servo {
    pwm: BoxedPwmChannel,
}

impl Servo {
    pub fn new(pwm: BoxedPwmChannel) -> Self {
        Self { pwm }
    }

    fn init(&mut self) -> Result<()> {
        self.pwm.set_period(SERVO_PERIOD)?;
        self.pwm.set_duty_cycle(servo_pulse(SERVO_CLOSED_ANGLE))?;
        self.pwm.enable(true)
    }

    fn set_angle(&mut self, angle: u8) -> Result<()> {
        self.pwm.set_duty_cycle(servo_pulse(angle))
    }

    fn stop(&mut self) -> Result<()> {
        self.pwm.enable(false)
    }
}

/// Fan on a GPIO line.
pub struct Fan {
    pin: BoxedOutputPin,
}

impl Fan {
    pub fn new(pin: BoxedOutputPin) -> Self {
        Self { pin }
    }
}

/// Alarm: an LED and a buzzer switched together.
pub struct Alarm {
    led: BoxedOutputPin,
    buzzer: BoxedOutputPin,
}

impl Alarm {
    pub fn new(led: BoxedOutputPin, buzzer: BoxedOutputPin) -> Self {
        Self { led, buzzer }
    }

    fn set(&mut self, on: bool) -> Result<()> {
        self.led.write(on)?;
        self.buzzer.write(on)
    }
}

/// One of the four output devices.
pub enum Actuator {
    RoomServo(Servo),
    VaultServo(Servo),
    Fan(Fan),
    Alarm(Alarm),
}

impl Actuator {
    pub fn id(&self) -> ActuatorId {
        match self {
            Self::RoomServo(_) => ActuatorId::RoomServo,
            Self::VaultServo(_) => ActuatorId::VaultServo,
            Self::Fan(_) => ActuatorId::Fan,
            Self::Alarm(_) => ActuatorId::Alarm,
        }
    }

    /// Put the device in its resting state: servos closed, outputs off.
    pub fn init(&mut self) -> Result<()> {
        match self {
            Self::RoomServo(servo) | Self::VaultServo(servo) => servo.init(),
            Self::Fan(fan) => fan.pin.write(false),
            Self::Alarm(alarm) => alarm.set(false),
        }
    }

    /// Apply a command value.
    pub fn set_value(&mut self, value: u8) -> Result<()> {
        match self {
            Self::RoomServo(servo) | Self::VaultServo(servo) => servo.set_angle(value),
            Self::Fan(fan) => fan.pin.write(value != 0),
            Self::Alarm(alarm) => alarm.set(value != 0),
        }
    }

    /// Release the device: PWM disabled, outputs off.
    pub fn stop(&mut self) -> Result<()> {
        match self {
            Self::RoomServo(servo) | Self::VaultServo(servo) => servo.stop(),
            Self::Fan(fan) => fan.pin.write(false),
            Self::Alarm(alarm) => alarm.set(false),
        }
    }

    /// Human-readable description of applying `value`, used in log records.
    pub fn describe(&self, value: u8) -> String {
        match self {
            Self::RoomServo(_) | Self::VaultServo(_) => {
                let angle = value.min(SERVO_MAX_ANGLE);
                let position = match angle {
                    0 => " (open)",
                    SERVO_CLOSED_ANGLE => " (closed)",
                    _ => "",
                };
                format!("{} to {angle} deg{position}", self.id().name())
            }
            Self::Fan(_) | Self::Alarm(_) => {
                format!("{} {}", self.id().name(), if value != 0 { "on" } else { "off" })
            }
        }
    }
}

/// The four actuators, indexed by [`ActuatorId`].
pub struct ActuatorBank {
    devices: [Actuator; ActuatorId::COUNT],
}

impl ActuatorBank {
    pub fn new(room_servo: Servo, vault_servo: Servo, fan: Fan, alarm: Alarm) -> Self {
        Self {
            devices: [
                Actuator::RoomServo(room_servo),
                Actuator::VaultServo(vault_servo),
                Actuator::Fan(fan),
                Actuator::Alarm(alarm),
            ],
        }
    }

    pub fn get_mut(&mut self, id: ActuatorId) -> &mut Actuator {
        &mut self.devices[id.index()]
    }

    pub fn get(&self, id: ActuatorId) -> &Actuator {
        &self.devices[id.index()]
    }

    /// Initialize every device; stops at the first failure.
    pub fn init_all(&mut self) -> Result<()> {
        self.devices.iter_mut().try_for_each(Actuator::init)
    }

    /// Stop every device, attempting all of them even if some fail.
    pub fn stop_all(&mut self) {
        for device in &mut self.devices {
            if let Err(e) = device.stop() {
                warn!(actuator = %device.id(), error = %e, "failed to stop actuator");
            }
        }
    }
}
