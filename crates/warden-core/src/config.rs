//! TOML configuration of the control core.
//!
//! Every section has sensible defaults so a minimal file (or none at all)
//! yields a runnable configuration; `load` parses and then validates.
//!
//! # TOML Example
//!
//! ```toml
//! log_level = "debug"
//!
//! [ipc]
//! backend = "posix"
//! capacity = 10
//!
//! [timing]
//! alarm_duration_ms = 30000
//!
//! [devices]
//! entry_rfid_port = "/dev/ttyS1"
//! pir_gpio = 17
//! ```

use crate::constants::*;
use crate::types::Settings;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    #[must_use]
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Top-level configuration of the control core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub log_level: LogLevel,
    pub ipc: IpcConfig,
    pub timing: TimingConfig,
    pub access: AccessConfig,
    /// Environment settings used until the storage service pushes its own.
    pub environment: Settings,
    pub devices: DevicesConfig,
}

impl WardenConfig {
    /// Load and validate configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the file cannot be read
    /// - `Error::ConfigParse` if the TOML is malformed
    /// - `Error::Config` if semantic validation fails
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    /// See [`WardenConfig::load`].
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: WardenConfig =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    /// Returns `Error::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        self.ipc.validate()?;
        self.timing.validate()?;
        self.access.validate()?;
        self.environment.validate()?;
        Ok(())
    }
}

/// Which queue implementation backs the IPC channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpcBackend {
    /// POSIX message queues, shared with the storage service process.
    #[default]
    Posix,
    /// In-process queues (tests, single-process bring-up).
    Local,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    pub backend: IpcBackend,
    /// Capacity in messages of every channel created by this process.
    pub capacity: usize,
    pub names: ChannelNames,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            backend: IpcBackend::default(),
            capacity: DEFAULT_CHANNEL_CAPACITY,
            names: ChannelNames::default(),
        }
    }
}

impl IpcConfig {
    fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config("ipc.capacity must be greater than 0".to_string()));
        }
        for name in self.names.all() {
            if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
                return Err(Error::Config(format!(
                    "channel name {name:?} must be '/' followed by a name without '/'"
                )));
            }
        }
        Ok(())
    }
}

/// Names of the channels making up the IPC topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub db: String,
    pub entry_auth: String,
    pub exit_auth: String,
    pub motion: String,
    pub vault_cmd: String,
    pub env_cmd: String,
    pub actuator: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            db: "/warden_db".to_string(),
            entry_auth: "/warden_entry_auth".to_string(),
            exit_auth: "/warden_exit_auth".to_string(),
            motion: "/warden_motion".to_string(),
            vault_cmd: "/warden_vault_cmd".to_string(),
            env_cmd: "/warden_env_cmd".to_string(),
            actuator: "/warden_actuator".to_string(),
        }
    }
}

impl ChannelNames {
    #[must_use]
    pub fn all(&self) -> [&str; 7] {
        [
            &self.db,
            &self.entry_auth,
            &self.exit_auth,
            &self.motion,
            &self.vault_cmd,
            &self.env_cmd,
            &self.actuator,
        ]
    }
}

/// Timing budgets for workers and protocol readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub monitor_wait_ms: u64,
    pub response_poll_ms: u64,
    pub alarm_duration_ms: u64,
    pub lf_stall_budget_ms: u64,
    pub uhf_poll_slice_ms: u64,
    pub uhf_scan_window_ms: u64,
    pub uhf_idle_window_ms: u64,
    pub fp_match_timeout_ms: u64,
    pub fp_enroll_step_timeout_ms: u64,
    pub fp_delete_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            monitor_wait_ms: MONITOR_WAIT_MS,
            response_poll_ms: RESPONSE_POLL_MS,
            alarm_duration_ms: DEFAULT_ALARM_DURATION_SECS * 1000,
            lf_stall_budget_ms: DEFAULT_LF_STALL_BUDGET_MS,
            uhf_poll_slice_ms: DEFAULT_UHF_POLL_SLICE_MS,
            uhf_scan_window_ms: DEFAULT_UHF_SCAN_WINDOW_MS,
            uhf_idle_window_ms: DEFAULT_UHF_IDLE_WINDOW_MS,
            fp_match_timeout_ms: DEFAULT_FP_MATCH_TIMEOUT_MS,
            fp_enroll_step_timeout_ms: DEFAULT_FP_ENROLL_STEP_TIMEOUT_MS,
            fp_delete_timeout_ms: DEFAULT_FP_DELETE_TIMEOUT_MS,
        }
    }
}

impl TimingConfig {
    #[must_use]
    pub fn monitor_wait(&self) -> Duration {
        Duration::from_millis(self.monitor_wait_ms)
    }

    #[must_use]
    pub fn response_poll(&self) -> Duration {
        Duration::from_millis(self.response_poll_ms)
    }

    #[must_use]
    pub fn alarm_duration(&self) -> Duration {
        Duration::from_millis(self.alarm_duration_ms)
    }

    fn validate(&self) -> Result<()> {
        // Stop requests are only observed between bounded waits.
        if self.monitor_wait_ms == 0 || self.monitor_wait_ms > MONITOR_WAIT_MS {
            return Err(Error::Config(format!(
                "timing.monitor_wait_ms must be within 1..={MONITOR_WAIT_MS}"
            )));
        }
        if self.response_poll_ms == 0 || self.response_poll_ms > RESPONSE_POLL_MS {
            return Err(Error::Config(format!(
                "timing.response_poll_ms must be within 1..={RESPONSE_POLL_MS}"
            )));
        }
        if self.alarm_duration_ms == 0 {
            return Err(Error::Config(
                "timing.alarm_duration_ms must be greater than 0".to_string(),
            ));
        }
        if self.uhf_poll_slice_ms == 0 || self.uhf_poll_slice_ms > self.uhf_scan_window_ms {
            return Err(Error::Config(
                "timing.uhf_poll_slice_ms must be within 1..=uhf_scan_window_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Access-flow policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Consecutive room-entry denials that raise the alarm.
    pub max_consecutive_failures: u32,
    pub servo_open_angle: u8,
    pub servo_closed_angle: u8,
    /// Run the dispatcher and executor under SCHED_FIFO. Disable on
    /// development hosts without CAP_SYS_NICE.
    pub realtime: bool,
    pub rt_priority: i32,
    pub uhf_rf_power_dbm: u8,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            servo_open_angle: SERVO_OPEN_ANGLE,
            servo_closed_angle: SERVO_CLOSED_ANGLE,
            realtime: true,
            rt_priority: DEFAULT_RT_PRIORITY,
            uhf_rf_power_dbm: DEFAULT_UHF_RF_POWER_DBM,
        }
    }
}

impl AccessConfig {
    fn validate(&self) -> Result<()> {
        if self.max_consecutive_failures == 0 {
            return Err(Error::Config(
                "access.max_consecutive_failures must be greater than 0".to_string(),
            ));
        }
        if self.servo_open_angle > 180 || self.servo_closed_angle > 180 {
            return Err(Error::Config("servo angles must be within 0..=180".to_string()));
        }
        if self.realtime && !(1..=99).contains(&self.rt_priority) {
            return Err(Error::Config(format!(
                "access.rt_priority must be within 1..=99, got {}",
                self.rt_priority
            )));
        }
        Ok(())
    }
}

/// PWM output identified by sysfs chip and channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmOutput {
    pub chip: u32,
    pub channel: u32,
}

/// Device paths and line numbers of the appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    pub irq_relay_device: PathBuf,
    pub entry_rfid_port: String,
    pub exit_rfid_port: String,
    pub lf_baud_rate: u32,
    pub uhf_port: String,
    pub uhf_baud_rate: u32,
    pub uhf_enable_gpio: u32,
    pub fingerprint_port: String,
    pub fingerprint_baud_rate: u32,
    pub i2c_bus: PathBuf,
    pub climate_address: u16,
    pub room_servo: PwmOutput,
    pub vault_servo: PwmOutput,
    pub fan_gpio: u32,
    pub alarm_led_gpio: u32,
    pub alarm_buzzer_gpio: u32,
    /// PIR input re-checked after a motion interrupt.
    pub pir_gpio: Option<u32>,
    /// Vault reed input re-checked before an inventory scan.
    pub vault_reed_gpio: Option<u32>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            irq_relay_device: PathBuf::from("/dev/warden_irq"),
            entry_rfid_port: "/dev/ttyS1".to_string(),
            exit_rfid_port: "/dev/ttyS2".to_string(),
            lf_baud_rate: 9600,
            uhf_port: "/dev/ttyS3".to_string(),
            uhf_baud_rate: 115_200,
            uhf_enable_gpio: 23,
            fingerprint_port: "/dev/ttyS4".to_string(),
            fingerprint_baud_rate: 19_200,
            i2c_bus: PathBuf::from("/dev/i2c-1"),
            climate_address: 0x38,
            room_servo: PwmOutput { chip: 0, channel: 0 },
            vault_servo: PwmOutput { chip: 0, channel: 1 },
            fan_gpio: 24,
            alarm_led_gpio: 25,
            alarm_buzzer_gpio: 26,
            pir_gpio: None,
            vault_reed_gpio: None,
        }
    }
}
