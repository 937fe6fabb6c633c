//! Frame codecs for the serial peripherals of the appliance.
//!
//! Each module is a pure codec: it builds and validates frames but never
//! touches a device. Timing (stall budgets, scan windows, response budgets)
//! lives with the readers in `warden-rfid` and `warden-biometric`.
//!
//! - [`lf`]: 125 kHz single-tag reader, ASCII-hex frames with XOR checksum
//! - [`uhf`]: multi-tag UHF module, binary frames with additive checksum
//! - [`fingerprint`]: fingerprint sensor, fixed 8-byte frames

pub mod fingerprint;
pub mod lf;
pub mod uhf;

pub use fingerprint::{AckStatus, FingerprintFrame, MatchOutcome};
pub use lf::{decode_lf_frame, encode_lf_frame, lf_checksum};
pub use uhf::{FrameType, ParsedFrame, UhfFrame, UhfStreamParser};
