//! Core constants for the Warden control core.
//!
//! This module centralizes the framing bytes of the three serial peripherals,
//! the default timing budgets used by the workers and protocol readers, and
//! the fixed capacities that bound every IPC message layout.
//!
//! # Time units
//!
//! Protocol budgets are expressed in milliseconds (`*_MS`). Worker-level
//! waits use one "time unit" of [`MONITOR_WAIT_MS`], and the alarm auto-off
//! duration is expressed in seconds.
//!
//! # Usage
//!
//! ```
//! use warden_core::constants::*;
//!
//! assert_eq!(LF_FRAME_LENGTH, 1 + LF_TAG_DIGITS + LF_CHECKSUM_DIGITS + 1);
//! assert_eq!(FP_FRAME_LENGTH, 8);
//! ```

// ============================================================================
// Low-frequency (125 kHz) single-tag RFID framing
// ============================================================================

/// Start-of-frame marker sent by the LF reader (STX).
pub const LF_START_BYTE: u8 = 0x02;

/// End-of-frame marker sent by the LF reader (ETX).
pub const LF_END_BYTE: u8 = 0x03;

/// Number of ASCII-hex digits carrying the tag identifier.
pub const LF_TAG_DIGITS: usize = 10;

/// Number of ASCII-hex digits carrying the XOR checksum.
pub const LF_CHECKSUM_DIGITS: usize = 2;

/// Total LF frame length: start + tag digits + checksum digits + end.
pub const LF_FRAME_LENGTH: usize = 1 + LF_TAG_DIGITS + LF_CHECKSUM_DIGITS + 1;

/// Default stall budget while collecting the body of an LF frame.
pub const DEFAULT_LF_STALL_BUDGET_MS: u64 = 100;

// ============================================================================
// UHF multi-tag RFID framing
// ============================================================================

/// UHF frame header byte.
pub const UHF_HEADER: u8 = 0xBB;

/// UHF frame tail byte.
pub const UHF_TAIL: u8 = 0x7E;

/// Bytes preceding the payload: header, type, command, length (2).
pub const UHF_PREFIX_LENGTH: usize = 5;

/// Bytes following the payload: checksum, tail.
pub const UHF_SUFFIX_LENGTH: usize = 2;

/// Receive buffer capacity of the UHF streaming parser.
///
/// Frames declaring a payload that cannot fit are rejected before any byte
/// past the declared header is examined.
pub const UHF_RX_BUFFER_SIZE: usize = 512;

/// Default polling slice inside a UHF scan window.
pub const DEFAULT_UHF_POLL_SLICE_MS: u64 = 100;

/// Default upper bound of a UHF scan window.
pub const DEFAULT_UHF_SCAN_WINDOW_MS: u64 = 3000;

/// Default idle period (no new unique tag) that ends a UHF scan early.
pub const DEFAULT_UHF_IDLE_WINDOW_MS: u64 = 500;

/// Default RF output power for the UHF module, in dBm.
pub const DEFAULT_UHF_RF_POWER_DBM: u8 = 26;

// ============================================================================
// Fingerprint sensor framing
// ============================================================================

/// Head and tail marker of every fingerprint frame.
pub const FP_MARKER: u8 = 0xF5;

/// Fixed fingerprint frame length.
pub const FP_FRAME_LENGTH: usize = 8;

/// Default response budget for a 1:N match.
pub const DEFAULT_FP_MATCH_TIMEOUT_MS: u64 = 5000;

/// Default response budget for each of the three enrollment steps.
pub const DEFAULT_FP_ENROLL_STEP_TIMEOUT_MS: u64 = 10_000;

/// Default response budget for deletion and housekeeping commands.
pub const DEFAULT_FP_DELETE_TIMEOUT_MS: u64 = 1000;

/// Maximum flush attempts before a fingerprint command is written.
pub const FP_FLUSH_RETRIES: usize = 5;

// ============================================================================
// Worker timing
// ============================================================================

/// One worker time unit: the bound of every monitor wait in a run loop.
pub const MONITOR_WAIT_MS: u64 = 1000;

/// Timed-receive budget per poll while awaiting the storage service.
pub const RESPONSE_POLL_MS: u64 = 1000;

/// Alarm auto-off duration in seconds.
pub const DEFAULT_ALARM_DURATION_SECS: u64 = 30;

/// Consecutive room-entry denials that raise the alarm.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Servo angle for an unlocked door.
pub const SERVO_OPEN_ANGLE: u8 = 0;

/// Servo angle for a locked door.
pub const SERVO_CLOSED_ANGLE: u8 = 90;

/// SCHED_FIFO priority for the interrupt dispatcher and actuator executor.
pub const DEFAULT_RT_PRIORITY: i32 = 80;

// ============================================================================
// Fixed capacities of IPC layouts
// ============================================================================

/// Maximum length of a tag identifier string (96-bit EPC as hex).
pub const TAG_CAPACITY: usize = 24;

/// Maximum number of unique tags collected by one inventory scan.
pub const MAX_INVENTORY_TAGS: usize = 32;

/// Maximum length of a log description in bytes.
pub const LOG_DESCRIPTION_CAPACITY: usize = 63;

/// Default capacity (messages) of every IPC channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;
