//! Fixed-layout encoding shared by every message type.
//!
//! Fields are little-endian. Strings occupy a fixed number of bytes and are
//! NUL-padded. An encoded message is zero-padded to exactly
//! [`WireMessage::SIZE`] bytes.

use bytes::{Buf, BufMut, BytesMut};
use warden_core::{Error, Result};

/// A message with a fixed encoded size.
pub trait WireMessage: Sized + Send + 'static {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Append the fields to `dst`. At most `SIZE` bytes may be written.
    fn encode_fields(&self, dst: &mut BytesMut);

    /// Decode from exactly `SIZE` bytes.
    fn decode_fields(src: &mut &[u8]) -> Result<Self>;

    /// Encode into a zero-padded frame of `SIZE` bytes.
    fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(Self::SIZE);
        self.encode_fields(&mut dst);
        debug_assert!(dst.len() <= Self::SIZE, "encoded past fixed size");
        dst.resize(Self::SIZE, 0);
        dst
    }

    /// Decode a frame, which must be exactly `SIZE` bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidMessageFormat` on a length mismatch, or the
    /// field-level error of the message type.
    fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(Error::InvalidMessageFormat(format!(
                "expected {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut src = bytes;
        Self::decode_fields(&mut src)
    }
}

/// Write `text` into `width` bytes, NUL-padded. Longer text is truncated.
pub fn put_fixed_str(dst: &mut BytesMut, text: &str, width: usize) {
    let bytes = text.as_bytes();
    let n = bytes.len().min(width);
    dst.put_slice(&bytes[..n]);
    dst.put_bytes(0, width - n);
}

/// Read a NUL-padded string of `width` bytes into a bounded string.
pub fn get_fixed_str<const N: usize>(src: &mut &[u8], width: usize) -> Result<heapless::String<N>> {
    if src.remaining() < width {
        return Err(Error::InvalidMessageFormat(format!(
            "string field needs {width} bytes, {} left",
            src.remaining()
        )));
    }
    let field = &src[..width];
    let end = field.iter().position(|b| *b == 0).unwrap_or(width);
    let text = std::str::from_utf8(&field[..end])
        .map_err(|e| Error::InvalidMessageFormat(format!("string field is not UTF-8: {e}")))?;
    let mut out = heapless::String::new();
    out.push_str(text).map_err(|_| Error::CapacityExceeded {
        what: "string field",
        capacity: N,
    })?;
    src.advance(width);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_str_padding() {
        let mut dst = BytesMut::new();
        put_fixed_str(&mut dst, "abc", 6);
        assert_eq!(&dst[..], b"abc\0\0\0");

        let mut src: &[u8] = &dst;
        let text: heapless::String<6> = get_fixed_str(&mut src, 6).unwrap();
        assert_eq!(text.as_str(), "abc");
        assert!(src.is_empty());
    }

    #[test]
    fn test_fixed_str_truncates_on_write() {
        let mut dst = BytesMut::new();
        put_fixed_str(&mut dst, "abcdef", 4);
        assert_eq!(&dst[..], b"abcd");
    }

    #[test]
    fn test_fixed_str_full_width_without_nul() {
        let mut src: &[u8] = b"wxyz";
        let text: heapless::String<4> = get_fixed_str(&mut src, 4).unwrap();
        assert_eq!(text.as_str(), "wxyz");
    }

    #[test]
    fn test_fixed_str_invalid_utf8() {
        let mut src: &[u8] = &[0xFF, 0xFE, 0, 0];
        assert!(get_fixed_str::<4>(&mut src, 4).is_err());
    }
}
