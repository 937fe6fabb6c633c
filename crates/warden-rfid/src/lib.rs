//! RFID readers for the Warden appliance.
//!
//! - [`LfReader`]: 125 kHz badge reader at the room doors, one tag per read
//! - [`UhfReader`]: multi-tag UHF module scanning the vault inventory
//!
//! Both implement [`warden_hardware::Sensor`] and own their serial port.

pub mod lf;
pub mod uhf;

pub use lf::LfReader;
pub use uhf::{UhfReader, UhfScanConfig};
