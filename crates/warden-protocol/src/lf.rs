//! Low-frequency single-tag RFID frames.
//!
//! ```text
//! STX  D0 D1 .. D9  C0 C1  ETX
//! 0x02 <10 hex tag> <2 hex> 0x03
//! ```
//!
//! The ten tag digits encode five raw bytes; the checksum digits encode the
//! XOR of those five bytes.
//!
//! # Example
//!
//! ```
//! use warden_protocol::lf::{decode_lf_frame, encode_lf_frame};
//!
//! let frame = encode_lf_frame("A1B2C3D4E5").unwrap();
//! let tag = decode_lf_frame(&frame).unwrap();
//! assert_eq!(tag.as_str(), "A1B2C3D4E5");
//! ```

use warden_core::constants::{
    LF_CHECKSUM_DIGITS, LF_END_BYTE, LF_FRAME_LENGTH, LF_START_BYTE, LF_TAG_DIGITS,
};
use warden_core::{Error, Result, TagId};

const TAG_BYTES: usize = LF_TAG_DIGITS / 2;

/// XOR of the raw tag bytes.
#[must_use]
pub fn lf_checksum(tag_bytes: &[u8]) -> u8 {
    tag_bytes.iter().fold(0, |acc, b| acc ^ b)
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        _ => None,
    }
}

fn decode_hex_pair(pair: &[u8]) -> Result<u8> {
    match (hex_value(pair[0]), hex_value(pair[1])) {
        (Some(hi), Some(lo)) => Ok(hi << 4 | lo),
        _ => Err(Error::InvalidFrame(format!(
            "non-hex digits {:?} in LF frame",
            String::from_utf8_lossy(pair)
        ))),
    }
}

/// Validate a complete LF frame and extract the tag string.
///
/// # Errors
///
/// - `Error::InvalidFrame` on wrong length, start/end byte or non-hex digits
/// - `Error::ChecksumMismatch` when the XOR checksum does not match
pub fn decode_lf_frame(frame: &[u8]) -> Result<TagId> {
    if frame.len() != LF_FRAME_LENGTH {
        return Err(Error::InvalidFrame(format!(
            "LF frame must be {LF_FRAME_LENGTH} bytes, got {}",
            frame.len()
        )));
    }
    if frame[0] != LF_START_BYTE {
        return Err(Error::InvalidFrame(format!(
            "LF frame starts with {:#04x}",
            frame[0]
        )));
    }
    if frame[LF_FRAME_LENGTH - 1] != LF_END_BYTE {
        return Err(Error::InvalidFrame(format!(
            "LF frame ends with {:#04x}",
            frame[LF_FRAME_LENGTH - 1]
        )));
    }

    let digits = &frame[1..1 + LF_TAG_DIGITS];
    let mut raw = [0u8; TAG_BYTES];
    for (slot, pair) in raw.iter_mut().zip(digits.chunks_exact(2)) {
        *slot = decode_hex_pair(pair)?;
    }

    let checksum_digits = &frame[1 + LF_TAG_DIGITS..1 + LF_TAG_DIGITS + LF_CHECKSUM_DIGITS];
    let actual = decode_hex_pair(checksum_digits)?;
    let expected = lf_checksum(&raw);
    if actual != expected {
        return Err(Error::ChecksumMismatch { expected, actual });
    }

    // Digits were validated as hex above, so they are ASCII.
    let tag = std::str::from_utf8(digits)
        .map_err(|_| Error::InvalidFrame("tag digits are not ASCII".to_string()))?;
    TagId::new(tag)
}

/// Build an LF frame for a 10-digit hex tag (used by mocks and tests).
///
/// # Errors
/// Returns `Error::InvalidTag` if `tag` is not exactly ten hex digits.
pub fn encode_lf_frame(tag: &str) -> Result<[u8; LF_FRAME_LENGTH]> {
    let digits = tag.as_bytes();
    if digits.len() != LF_TAG_DIGITS || !digits.iter().all(|d| hex_value(*d).is_some()) {
        return Err(Error::InvalidTag(format!(
            "LF tag must be {LF_TAG_DIGITS} hex digits, got {tag:?}"
        )));
    }

    let mut raw = [0u8; TAG_BYTES];
    for (slot, pair) in raw.iter_mut().zip(digits.chunks_exact(2)) {
        *slot = decode_hex_pair(pair)?;
    }
    let checksum = format!("{:02X}", lf_checksum(&raw));

    let mut frame = [0u8; LF_FRAME_LENGTH];
    frame[0] = LF_START_BYTE;
    frame[1..1 + LF_TAG_DIGITS].copy_from_slice(digits);
    frame[1 + LF_TAG_DIGITS..1 + LF_TAG_DIGITS + LF_CHECKSUM_DIGITS]
        .copy_from_slice(checksum.as_bytes());
    frame[LF_FRAME_LENGTH - 1] = LF_END_BYTE;
    Ok(frame)
}
