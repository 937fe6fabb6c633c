//! Fingerprint sensor driver for the vault door.
//!
//! [`FingerprintReader`] speaks the sensor's 8-byte command protocol over a
//! serial port: 1:N identification, three-step enrollment, deletion and a
//! stored-user count. Every command is preceded by an input flush and bounded
//! by its own response budget.

pub mod reader;

pub use reader::{FingerprintMatch, FingerprintReader, FingerprintTimeouts, MatchResult};
