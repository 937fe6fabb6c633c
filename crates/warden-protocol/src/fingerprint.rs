//! Fingerprint sensor frames.
//!
//! Every command and response is exactly eight bytes:
//!
//! ```text
//! 0xF5  CMD  P1  P2  P3  0x00  CHK  0xF5
//! ```
//!
//! `CHK` is the XOR of bytes 1 through 5. In responses `P3` carries the
//! acknowledgement status; for a 1:N match `P1 P2` is the matched user id
//! (big-endian) and `P3` the stored permission level.
//!
//! # Example
//!
//! ```
//! use warden_protocol::fingerprint::{FingerprintFrame, MatchOutcome, command};
//!
//! let request = FingerprintFrame::match_one_to_n();
//! assert_eq!(request.encode()[1], command::MATCH_1N);
//!
//! let reply = FingerprintFrame::new(command::MATCH_1N, [0x00, 0x2A, 2]);
//! let decoded = FingerprintFrame::decode(&reply.encode()).unwrap();
//! assert_eq!(
//!     decoded.match_outcome().unwrap(),
//!     MatchOutcome::Matched { user_id: 42, level: 2 }
//! );
//! ```

use std::fmt;
use warden_core::constants::{FP_FRAME_LENGTH, FP_MARKER};
use warden_core::{Error, Result};

/// Command codes.
pub mod command {
    /// First enrollment capture.
    pub const ADD_1: u8 = 0x01;
    /// Second enrollment capture.
    pub const ADD_2: u8 = 0x02;
    /// Third enrollment capture; the template is stored on success.
    pub const ADD_3: u8 = 0x03;
    /// Delete one user.
    pub const DELETE_USER: u8 = 0x04;
    /// Delete every user.
    pub const DELETE_ALL: u8 = 0x05;
    /// Number of stored users.
    pub const USER_COUNT: u8 = 0x09;
    /// 1:N identification.
    pub const MATCH_1N: u8 = 0x0C;
}

/// Acknowledgement status reported in byte 4 of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Success,
    Fail,
    Full,
    NoUser,
    UserOccupied,
    FingerOccupied,
    Timeout,
    Unknown(u8),
}

impl AckStatus {
    #[must_use]
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::Fail,
            0x04 => Self::Full,
            0x05 => Self::NoUser,
            0x06 => Self::UserOccupied,
            0x07 => Self::FingerOccupied,
            0x08 => Self::Timeout,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fail => write!(f, "fail"),
            Self::Full => write!(f, "database full"),
            Self::NoUser => write!(f, "no such user"),
            Self::UserOccupied => write!(f, "user id occupied"),
            Self::FingerOccupied => write!(f, "finger already enrolled"),
            Self::Timeout => write!(f, "capture timeout"),
            Self::Unknown(code) => write!(f, "unknown status {code:#04x}"),
        }
    }
}

/// Result of a 1:N identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A stored template matched; `level` is the stored permission (1..=3).
    Matched { user_id: u16, level: u8 },
    /// No template matched, or no finger was presented in time.
    NoMatch,
}

/// One 8-byte frame, either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintFrame {
    pub command: u8,
    pub params: [u8; 3],
}

/// XOR of the command and parameter bytes (frame bytes 1..=5).
#[must_use]
pub fn fp_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

impl FingerprintFrame {
    #[must_use]
    pub const fn new(command: u8, params: [u8; 3]) -> Self {
        Self { command, params }
    }

    /// 1:N identification request.
    #[must_use]
    pub const fn match_one_to_n() -> Self {
        Self::new(command::MATCH_1N, [0, 0, 0])
    }

    /// Enrollment step `step` (1..=3) for `user_id` with `permission`.
    ///
    /// # Errors
    /// Returns `Error::InvalidCommandCode` if `step` is outside 1..=3.
    pub fn enroll_step(step: u8, user_id: u16, permission: u8) -> Result<Self> {
        let command = match step {
            1 => command::ADD_1,
            2 => command::ADD_2,
            3 => command::ADD_3,
            other => return Err(Error::InvalidCommandCode(other)),
        };
        let [hi, lo] = user_id.to_be_bytes();
        Ok(Self::new(command, [hi, lo, permission]))
    }

    /// Delete request for `user_id`.
    #[must_use]
    pub const fn delete_user(user_id: u16) -> Self {
        let [hi, lo] = user_id.to_be_bytes();
        Self::new(command::DELETE_USER, [hi, lo, 0])
    }

    /// Stored user count request.
    #[must_use]
    pub const fn user_count() -> Self {
        Self::new(command::USER_COUNT, [0, 0, 0])
    }

    #[must_use]
    pub fn encode(&self) -> [u8; FP_FRAME_LENGTH] {
        let mut frame = [0u8; FP_FRAME_LENGTH];
        frame[0] = FP_MARKER;
        frame[1] = self.command;
        frame[2..5].copy_from_slice(&self.params);
        frame[5] = 0;
        frame[6] = fp_checksum(&frame[1..6]);
        frame[7] = FP_MARKER;
        frame
    }

    /// Validate markers, length and checksum.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidFrame` on wrong length or missing markers
    /// - `Error::ChecksumMismatch` if the XOR checksum is wrong
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != FP_FRAME_LENGTH {
            return Err(Error::InvalidFrame(format!(
                "fingerprint frame must be {FP_FRAME_LENGTH} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[0] != FP_MARKER || bytes[7] != FP_MARKER {
            return Err(Error::InvalidFrame(format!(
                "fingerprint frame markers {:#04x}/{:#04x}",
                bytes[0], bytes[7]
            )));
        }
        let expected = fp_checksum(&bytes[1..6]);
        if bytes[6] != expected {
            return Err(Error::ChecksumMismatch {
                expected,
                actual: bytes[6],
            });
        }
        Ok(Self::new(bytes[1], [bytes[2], bytes[3], bytes[4]]))
    }

    /// Status byte of a response.
    #[must_use]
    pub fn status(&self) -> AckStatus {
        AckStatus::from_u8(self.params[2])
    }

    /// User id carried in P1/P2.
    #[must_use]
    pub fn user_id(&self) -> u16 {
        u16::from_be_bytes([self.params[0], self.params[1]])
    }

    /// Interpret a 1:N match response.
    ///
    /// Status 1..=3 is a match at that permission level. `NoUser` and
    /// `Timeout` mean no match.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCommandCode` if this is not a match response
    /// - `Error::InvalidMessageFormat` for any other status
    pub fn match_outcome(&self) -> Result<MatchOutcome> {
        if self.command != command::MATCH_1N {
            return Err(Error::InvalidCommandCode(self.command));
        }
        match self.params[2] {
            level @ 1..=3 => Ok(MatchOutcome::Matched {
                user_id: self.user_id(),
                level,
            }),
            _ => match self.status() {
                AckStatus::NoUser | AckStatus::Timeout => Ok(MatchOutcome::NoMatch),
                other => Err(Error::InvalidMessageFormat(format!(
                    "unexpected match status: {other}"
                ))),
            },
        }
    }
}
