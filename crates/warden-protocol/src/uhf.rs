//! UHF multi-tag RFID frames and a bounded streaming parser.
//!
//! # Frame layout
//!
//! ```text
//! HDR   TYPE  CMD   LEN_HI LEN_LO  PAYLOAD..  CHK   TAIL
//! 0xBB  u8    u8    u16 big-endian  LEN bytes u8    0x7E
//! ```
//!
//! `CHK` is the sum, modulo 256, of every byte from `TYPE` through the end of
//! the payload. Total frame length is `5 + LEN + 2`.
//!
//! # Usage
//!
//! ```
//! use warden_protocol::uhf::{UhfFrame, UhfStreamParser};
//!
//! let mut parser = UhfStreamParser::new();
//! let bytes = UhfFrame::stop_inventory().encode();
//!
//! parser.feed(&bytes[..3]);
//! assert!(parser.next_frame().is_none());
//! parser.feed(&bytes[3..]);
//!
//! let parsed = parser.next_frame().unwrap();
//! assert!(parsed.checksum_ok);
//! assert_eq!(parsed.frame.command, 0x28);
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::VecDeque;
use tracing::warn;
use warden_core::constants::{
    UHF_HEADER, UHF_PREFIX_LENGTH, UHF_RX_BUFFER_SIZE, UHF_SUFFIX_LENGTH, UHF_TAIL,
};
use warden_core::{Error, Result, TagId};

/// Command codes understood by the module.
pub mod command {
    /// Read module information.
    pub const GET_INFO: u8 = 0x03;
    /// Single inventory round; also the command code of tag notifications.
    pub const SINGLE_POLL: u8 = 0x22;
    /// Start continuous inventory.
    pub const MULTI_POLL: u8 = 0x27;
    /// Stop continuous inventory.
    pub const STOP_MULTI_POLL: u8 = 0x28;
    /// Set RF output power.
    pub const SET_POWER: u8 = 0xB6;
    /// Error response.
    pub const ERROR: u8 = 0xFF;
}

/// Inventory round count that keeps the module polling until stopped.
pub const CONTINUOUS_POLL_COUNT: u16 = 0xFFFF;

/// Frame direction/kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Host to module.
    Command = 0x00,
    /// Module reply to a command.
    Response = 0x01,
    /// Unsolicited module report (tag seen).
    Notification = 0x02,
}

impl FrameType {
    /// Parse a type byte.
    ///
    /// # Errors
    /// Returns `Error::InvalidFrame` for unknown type bytes.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Command),
            0x01 => Ok(Self::Response),
            0x02 => Ok(Self::Notification),
            other => Err(Error::InvalidFrame(format!(
                "unknown UHF frame type {other:#04x}"
            ))),
        }
    }
}

/// A decoded UHF frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UhfFrame {
    pub frame_type: FrameType,
    pub command: u8,
    pub payload: Bytes,
}

/// Additive checksum over type, command, length and payload.
#[must_use]
pub fn uhf_checksum(frame_type: u8, command: u8, payload: &[u8]) -> u8 {
    let len = payload.len() as u16;
    let header_sum = frame_type
        .wrapping_add(command)
        .wrapping_add((len >> 8) as u8)
        .wrapping_add(len as u8);
    payload.iter().fold(header_sum, |acc, b| acc.wrapping_add(*b))
}

/// Total encoded length of a frame carrying `payload_len` bytes.
#[must_use]
pub const fn frame_length(payload_len: usize) -> usize {
    UHF_PREFIX_LENGTH + payload_len + UHF_SUFFIX_LENGTH
}

impl UhfFrame {
    /// A host command frame.
    pub fn command(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Command,
            command,
            payload: payload.into(),
        }
    }

    /// Start continuous inventory for `rounds` rounds.
    #[must_use]
    pub fn start_inventory(rounds: u16) -> Self {
        let [hi, lo] = rounds.to_be_bytes();
        Self::command(command::MULTI_POLL, vec![0x22, hi, lo])
    }

    /// Stop continuous inventory.
    #[must_use]
    pub fn stop_inventory() -> Self {
        Self::command(command::STOP_MULTI_POLL, Bytes::new())
    }

    /// Set RF output power. The module expects hundredths of a dBm.
    #[must_use]
    pub fn set_rf_power(dbm: u8) -> Self {
        let centi = u16::from(dbm) * 100;
        Self::command(command::SET_POWER, centi.to_be_bytes().to_vec())
    }

    /// True for notifications that report a seen tag.
    #[must_use]
    pub fn is_tag_notification(&self) -> bool {
        self.frame_type == FrameType::Notification && self.command == command::SINGLE_POLL
    }

    /// Encode into a freshly allocated buffer.
    #[must_use]
    pub fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(frame_length(self.payload.len()));
        self.encode_into(&mut dst);
        dst
    }

    /// Append the encoded frame to `dst`.
    pub fn encode_into(&self, dst: &mut BytesMut) {
        let frame_type = self.frame_type as u8;
        dst.reserve(frame_length(self.payload.len()));
        dst.put_u8(UHF_HEADER);
        dst.put_u8(frame_type);
        dst.put_u8(self.command);
        dst.put_u16(self.payload.len() as u16);
        dst.put_slice(&self.payload);
        dst.put_u8(uhf_checksum(frame_type, self.command, &self.payload));
        dst.put_u8(UHF_TAIL);
    }

    /// Extract the EPC of a tag notification as an upper-case hex tag id.
    ///
    /// Payload layout: `RSSI(1) PC(2) EPC(n) CRC(2)`, where the top five bits
    /// of PC give the EPC length in 16-bit words.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidFrame` if this is not a tag notification or the
    ///   payload is shorter than PC declares
    /// - `Error::InvalidTag` if the EPC does not fit a tag id
    pub fn tag_epc(&self) -> Result<TagId> {
        if !self.is_tag_notification() {
            return Err(Error::InvalidFrame(format!(
                "frame {:?}/{:#04x} is not a tag notification",
                self.frame_type, self.command
            )));
        }
        let payload = &self.payload;
        if payload.len() < 5 {
            return Err(Error::InvalidFrame(format!(
                "tag notification payload too short: {} bytes",
                payload.len()
            )));
        }
        let pc = u16::from_be_bytes([payload[1], payload[2]]);
        let epc_len = usize::from(pc >> 11) * 2;
        if payload.len() < 3 + epc_len + 2 {
            return Err(Error::InvalidFrame(format!(
                "PC declares {epc_len} EPC bytes, payload has {}",
                payload.len()
            )));
        }
        let hex: String = payload[3..3 + epc_len]
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();
        TagId::new(&hex)
    }

    /// Build a tag notification for `epc` (used by mocks and tests).
    #[must_use]
    pub fn tag_notification(rssi: u8, epc: &[u8]) -> Self {
        let words = (epc.len() / 2) as u16;
        let pc = (words << 11).to_be_bytes();
        let mut payload = Vec::with_capacity(1 + 2 + epc.len() + 2);
        payload.push(rssi);
        payload.extend_from_slice(&pc);
        payload.extend_from_slice(epc);
        payload.extend_from_slice(&[0x00, 0x00]);
        Self {
            frame_type: FrameType::Notification,
            command: command::SINGLE_POLL,
            payload: payload.into(),
        }
    }
}

/// A frame pulled off the stream, with the checksum verdict.
///
/// Checksum mismatches are tolerated: the module occasionally reports a bad
/// checksum on otherwise intact frames, so the frame is still delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    pub frame: UhfFrame,
    pub checksum_ok: bool,
}

/// Parser states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Discarding bytes until a header byte.
    WaitingHeader,
    /// Header seen, waiting for the rest of a frame of `total` bytes.
    ReadingFrame { total: usize },
}

/// Bounded streaming parser for UHF frames.
///
/// ```text
/// ┌──────────────┐ 0xBB + 4 bytes ┌──────────────┐ total bytes ┌─────────────┐
/// │WaitingHeader │───────────────>│ ReadingFrame │────────────>│ Frame ready │
/// └──────────────┘                └──────────────┘             └─────────────┘
///     ^   │ other bytes (dropped)        │ bad tail / type            │
///     │   └──────────────────────────────┘ (drop header, resync)      │
///     └───────────────────────────────────────────────────────────────┘
/// ```
///
/// A declared length that cannot fit in [`UHF_RX_BUFFER_SIZE`] is rejected
/// as soon as the length field is read.
#[derive(Debug)]
pub struct UhfStreamParser {
    buffer: BytesMut,
    state: ParserState,
    frames: VecDeque<ParsedFrame>,
    capacity: usize,
    rejected: u64,
}

impl Default for UhfStreamParser {
    fn default() -> Self {
        Self::new()
    }
}

impl UhfStreamParser {
    /// Parser with the default receive buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(UHF_RX_BUFFER_SIZE)
    }

    /// Parser with a custom receive buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: ParserState::WaitingHeader,
            frames: VecDeque::with_capacity(4),
            capacity,
            rejected: 0,
        }
    }

    /// Append received bytes and extract every complete frame.
    pub fn feed(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(self.capacity.max(1)) {
            if self.buffer.len() + chunk.len() > self.capacity {
                // Only an incomplete frame can be pending here, and its
                // declared length already passed the capacity check.
                let keep = self.capacity.saturating_sub(chunk.len());
                let excess = self.buffer.len().saturating_sub(keep);
                self.buffer.advance(excess);
                self.state = ParserState::WaitingHeader;
            }
            self.buffer.extend_from_slice(chunk);
            self.process();
        }
    }

    /// Take the next complete frame, if any.
    pub fn next_frame(&mut self) -> Option<ParsedFrame> {
        self.frames.pop_front()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Bytes buffered but not yet part of a complete frame.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames rejected since creation (bad type, bad tail, oversize).
    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected
    }

    /// Drop buffered bytes and queued frames.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.frames.clear();
        self.state = ParserState::WaitingHeader;
    }

    fn process(&mut self) {
        loop {
            match self.state {
                ParserState::WaitingHeader => {
                    match self.buffer.iter().position(|b| *b == UHF_HEADER) {
                        Some(pos) => self.buffer.advance(pos),
                        None => {
                            self.buffer.clear();
                            return;
                        }
                    }
                    if self.buffer.len() < UHF_PREFIX_LENGTH {
                        return;
                    }
                    let declared = usize::from(u16::from_be_bytes([self.buffer[3], self.buffer[4]]));
                    let total = frame_length(declared);
                    if total > self.capacity {
                        warn!(declared, capacity = self.capacity, "UHF frame length exceeds receive buffer");
                        self.reject();
                        continue;
                    }
                    self.state = ParserState::ReadingFrame { total };
                }
                ParserState::ReadingFrame { total } => {
                    if self.buffer.len() < total {
                        return;
                    }
                    match self.validate(total) {
                        Ok(parsed) => {
                            self.buffer.advance(total);
                            self.frames.push_back(parsed);
                            self.state = ParserState::WaitingHeader;
                        }
                        Err(e) => {
                            warn!(error = %e, "rejecting UHF frame");
                            self.reject();
                        }
                    }
                }
            }
        }
    }

    /// Drop the header byte and resynchronize on the next one.
    fn reject(&mut self) {
        self.rejected += 1;
        self.buffer.advance(1);
        self.state = ParserState::WaitingHeader;
    }

    fn validate(&self, total: usize) -> Result<ParsedFrame> {
        let raw = &self.buffer[..total];
        if raw[total - 1] != UHF_TAIL {
            return Err(Error::InvalidFrame(format!(
                "UHF frame tail is {:#04x}",
                raw[total - 1]
            )));
        }
        let frame_type = FrameType::from_u8(raw[1])?;
        let command = raw[2];
        let payload = &raw[UHF_PREFIX_LENGTH..total - UHF_SUFFIX_LENGTH];
        let expected = uhf_checksum(raw[1], command, payload);
        let actual = raw[total - 2];
        let checksum_ok = expected == actual;
        if !checksum_ok {
            warn!(
                expected = format_args!("{expected:#04x}"),
                actual = format_args!("{actual:#04x}"),
                command = format_args!("{command:#04x}"),
                "UHF checksum mismatch, accepting frame"
            );
        }
        Ok(ParsedFrame {
            frame: UhfFrame {
                frame_type,
                command,
                payload: Bytes::copy_from_slice(payload),
            },
            checksum_ok,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stop_inventory_encoding() {
        let bytes = UhfFrame::stop_inventory().encode();
        assert_eq!(&bytes[..], &[0xBB, 0x00, 0x28, 0x00, 0x00, 0x28, 0x7E]);
    }

    #[test]
    fn test_start_inventory_encoding() {
        let bytes = UhfFrame::start_inventory(10_000).encode();
        // 10000 = 0x2710
        assert_eq!(
            &bytes[..],
            &[0xBB, 0x00, 0x27, 0x00, 0x03, 0x22, 0x27, 0x10, 0x83, 0x7E]
        );
    }

    #[test]
    fn test_set_power_encoding() {
        let frame = UhfFrame::set_rf_power(26);
        assert_eq!(&frame.payload[..], &[0x0A, 0x28]);
        assert_eq!(frame.encode().len(), frame_length(2));
    }

    #[test]
    fn test_split_feed_yields_one_frame() {
        let bytes = UhfFrame::tag_notification(0xC9, &[0xE2, 0x00, 0x12, 0x34]).encode();
        let mut parser = UhfStreamParser::new();
        for byte in bytes.iter() {
            parser.feed(&[*byte]);
        }
        let parsed = parser.next_frame().unwrap();
        assert!(parsed.checksum_ok);
        assert_eq!(parsed.frame.tag_epc().unwrap().as_str(), "E2001234");
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.state(), ParserState::WaitingHeader);
    }

    #[test]
    fn test_multiple_frames_and_garbage() {
        let mut stream = vec![0x00, 0x11, 0x7E];
        stream.extend_from_slice(&UhfFrame::stop_inventory().encode());
        stream.extend_from_slice(&[0x42]);
        stream.extend_from_slice(&UhfFrame::set_rf_power(20).encode());

        let mut parser = UhfStreamParser::new();
        parser.feed(&stream);
        assert_eq!(parser.next_frame().unwrap().frame.command, command::STOP_MULTI_POLL);
        assert_eq!(parser.next_frame().unwrap().frame.command, command::SET_POWER);
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_checksum_mismatch_is_accepted() {
        let mut bytes = UhfFrame::stop_inventory().encode();
        bytes[5] ^= 0xFF;
        let mut parser = UhfStreamParser::new();
        parser.feed(&bytes);
        let parsed = parser.next_frame().unwrap();
        assert!(!parsed.checksum_ok);
        assert_eq!(parsed.frame.command, command::STOP_MULTI_POLL);
    }

    #[test]
    fn test_bad_tail_rejected_then_resync() {
        let mut bad = UhfFrame::stop_inventory().encode();
        let last = bad.len() - 1;
        bad[last] = 0x00;
        let mut stream = bad.to_vec();
        stream.extend_from_slice(&UhfFrame::stop_inventory().encode());

        let mut parser = UhfStreamParser::new();
        parser.feed(&stream);
        assert_eq!(parser.rejected_count(), 1);
        assert!(parser.next_frame().unwrap().checksum_ok);
        assert!(parser.next_frame().is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut bytes = UhfFrame::stop_inventory().encode();
        bytes[1] = 0x09;
        let mut parser = UhfStreamParser::new();
        parser.feed(&bytes);
        assert!(parser.next_frame().is_none());
        assert_eq!(parser.rejected_count(), 1);
    }

    #[test]
    fn test_oversize_length_rejected_before_payload() {
        let mut parser = UhfStreamParser::new();
        // Declares 0xFFFF payload bytes; only the prefix is supplied.
        parser.feed(&[0xBB, 0x02, 0x22, 0xFF, 0xFF]);
        assert_eq!(parser.rejected_count(), 1);
        assert_eq!(parser.state(), ParserState::WaitingHeader);
        assert_eq!(parser.buffered_len(), 0);

        parser.feed(&UhfFrame::stop_inventory().encode());
        assert!(parser.next_frame().is_some());
    }

    #[test]
    fn test_tag_epc_from_response_is_error() {
        let frame = UhfFrame {
            frame_type: FrameType::Response,
            command: command::SET_POWER,
            payload: Bytes::from_static(&[0x00]),
        };
        assert!(matches!(frame.tag_epc(), Err(Error::InvalidFrame(_))));
    }

    #[test]
    fn test_tag_epc_short_payload_is_error() {
        let mut frame = UhfFrame::tag_notification(0xC0, &[0xE2, 0x00, 0x12, 0x34]);
        frame.payload = frame.payload.slice(..5);
        assert!(frame.tag_epc().is_err());
    }

    #[test]
    fn test_tag_epc_96_bit() {
        let epc = [0xE2, 0x80, 0x11, 0x60, 0x60, 0x00, 0x02, 0x09, 0x8A, 0xBC, 0xDE, 0xF0];
        let frame = UhfFrame::tag_notification(0xC0, &epc);
        assert_eq!(frame.tag_epc().unwrap().as_str(), "E2801160600002098ABCDEF0");
    }

    proptest! {
        #[test]
        fn prop_parser_never_exceeds_capacity(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let mut parser = UhfStreamParser::new();
            parser.feed(&data);
            prop_assert!(parser.buffered_len() <= UHF_RX_BUFFER_SIZE);
        }

        #[test]
        fn prop_frame_survives_any_split(
            payload in proptest::collection::vec(any::<u8>(), 0..64),
            split in 0usize..80,
        ) {
            let bytes = UhfFrame::command(command::GET_INFO, payload.clone()).encode();
            let split = split.min(bytes.len());
            let mut parser = UhfStreamParser::new();
            parser.feed(&bytes[..split]);
            parser.feed(&bytes[split..]);
            let parsed = parser.next_frame().unwrap();
            prop_assert!(parsed.checksum_ok);
            prop_assert_eq!(&parsed.frame.payload[..], &payload[..]);
        }
    }
}
