//! The full set of devices on the appliance, opened from configuration.
//!
//! The composition root opens everything up front and hands each device to
//! the one worker that owns it.

use crate::actuators::{ActuatorBank, Alarm, Fan, Servo};
use crate::error::Result;
use crate::linux::{LinuxI2c, SerialUart, SysfsGpio, SysfsPwm};
use crate::mock::{
    MockI2c, MockI2cHandle, MockInputPin, MockInputPinHandle, MockOutputPin, MockOutputPinHandle,
    MockPwm, MockPwmHandle, MockUart, MockUartHandle,
};
use crate::traits::{BoxedI2cBus, BoxedInputPin, BoxedOutputPin, BoxedUart, UartSettings};
use tracing::info;
use warden_core::config::DevicesConfig;

/// Every device, unowned by any worker yet.
pub struct Peripherals {
    pub entry_rfid: BoxedUart,
    pub exit_rfid: BoxedUart,
    pub uhf: BoxedUart,
    pub uhf_enable: BoxedOutputPin,
    pub fingerprint: BoxedUart,
    pub climate: BoxedI2cBus,
    pub actuators: ActuatorBank,
    pub pir: Option<BoxedInputPin>,
    pub vault_reed: Option<BoxedInputPin>,
}

fn optional_input(line: Option<u32>) -> Result<Option<BoxedInputPin>> {
    line.map(|line| SysfsGpio::input(line).map(|pin| Box::new(pin) as BoxedInputPin))
        .transpose()
}

impl Peripherals {
    /// Open the Linux devices named in `devices`.
    pub fn open(devices: &DevicesConfig) -> Result<Self> {
        let lf = UartSettings::eight_n_one(devices.lf_baud_rate);
        let actuators = ActuatorBank::new(
            Servo::new(Box::new(SysfsPwm::open(
                devices.room_servo.chip,
                devices.room_servo.channel,
            )?)),
            Servo::new(Box::new(SysfsPwm::open(
                devices.vault_servo.chip,
                devices.vault_servo.channel,
            )?)),
            Fan::new(Box::new(SysfsGpio::output(devices.fan_gpio)?)),
            Alarm::new(
                Box::new(SysfsGpio::output(devices.alarm_led_gpio)?),
                Box::new(SysfsGpio::output(devices.alarm_buzzer_gpio)?),
            ),
        );

        let peripherals = Self {
            entry_rfid: Box::new(SerialUart::open(&devices.entry_rfid_port, lf)?),
            exit_rfid: Box::new(SerialUart::open(&devices.exit_rfid_port, lf)?),
            uhf: Box::new(SerialUart::open(
                &devices.uhf_port,
                UartSettings::eight_n_one(devices.uhf_baud_rate),
            )?),
            uhf_enable: Box::new(SysfsGpio::output(devices.uhf_enable_gpio)?),
            fingerprint: Box::new(SerialUart::open(
                &devices.fingerprint_port,
                UartSettings::eight_n_one(devices.fingerprint_baud_rate),
            )?),
            climate: Box::new(LinuxI2c::open(&devices.i2c_bus, devices.climate_address)?),
            actuators,
            pir: optional_input(devices.pir_gpio)?,
            vault_reed: optional_input(devices.vault_reed_gpio)?,
        };
        info!("peripherals opened");
        Ok(peripherals)
    }

    /// Mock devices plus the handles that drive them.
    ///
    /// The PIR and vault reed inputs are present, idle low.
    pub fn mock() -> (Self, MockPeripherals) {
        let (entry_rfid, entry_rfid_h) = MockUart::new();
        let (exit_rfid, exit_rfid_h) = MockUart::new();
        let (uhf, uhf_h) = MockUart::new();
        let (uhf_enable, uhf_enable_h) = MockOutputPin::new();
        let (fingerprint, fingerprint_h) = MockUart::new();
        let (climate, climate_h) = MockI2c::new();
        let (room_servo, room_servo_h) = MockPwm::new();
        let (vault_servo, vault_servo_h) = MockPwm::new();
        let (fan, fan_h) = MockOutputPin::new();
        let (led, led_h) = MockOutputPin::new();
        let (buzzer, buzzer_h) = MockOutputPin::new();
        let (pir, pir_h) = MockInputPin::new(false);
        let (vault_reed, vault_reed_h) = MockInputPin::new(false);

        let peripherals = Self {
            entry_rfid: Box::new(entry_rfid),
            exit_rfid: Box::new(exit_rfid),
            uhf: Box::new(uhf),
            uhf_enable: Box::new(uhf_enable),
            fingerprint: Box::new(fingerprint),
            climate: Box::new(climate),
            actuators: ActuatorBank::new(
                Servo::new(Box::new(room_servo)),
                Servo::new(Box::new(vault_servo)),
                Fan::new(Box::new(fan)),
                Alarm::new(Box::new(led), Box::new(buzzer)),
            ),
            pir: Some(Box::new(pir)),
            vault_reed: Some(Box::new(vault_reed)),
        };
        let handles = MockPeripherals {
            entry_rfid: entry_rfid_h,
            exit_rfid: exit_rfid_h,
            uhf: uhf_h,
            uhf_enable: uhf_enable_h,
            fingerprint: fingerprint_h,
            climate: climate_h,
            room_servo: room_servo_h,
            vault_servo: vault_servo_h,
            fan: fan_h,
            alarm_led: led_h,
            alarm_buzzer: buzzer_h,
            pir: pir_h,
            vault_reed: vault_reed_h,
        };
        (peripherals, handles)
    }
}

/// Handles to the devices of [`Peripherals::mock`].
#[derive(Clone)]
pub struct MockPeripherals {
    pub entry_rfid: MockUartHandle,
    pub exit_rfid: MockUartHandle,
    pub uhf: MockUartHandle,
    pub uhf_enable: MockOutputPinHandle,
    pub fingerprint: MockUartHandle,
    pub climate: MockI2cHandle,
    pub room_servo: MockPwmHandle,
    pub vault_servo: MockPwmHandle,
    pub fan: MockOutputPinHandle,
    pub alarm_led: MockOutputPinHandle,
    pub alarm_buzzer: MockOutputPinHandle,
    pub pir: MockInputPinHandle,
    pub vault_reed: MockInputPinHandle,
}
