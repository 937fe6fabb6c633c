//! Low-frequency badge reader.

use std::time::{Duration, Instant};
use tracing::debug;
use warden_core::TagId;
use warden_core::constants::{
    DEFAULT_LF_STALL_BUDGET_MS, LF_FRAME_LENGTH, LF_START_BYTE, MONITOR_WAIT_MS,
};
use warden_hardware::{BoxedUart, HardwareError, Result, Sensor, UartSettings};
use warden_protocol::lf::decode_lf_frame;

/// Reads one LF frame per call.
///
/// A read waits (bounded) for the start byte, then collects the remaining
/// 13 bytes under a stall budget that restarts whenever bytes arrive. Input
/// is flushed afterwards whatever the outcome, so a partial or repeated
/// frame never bleeds into the next read.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use warden_hardware::mock::MockUart;
/// use warden_hardware::Sensor;
/// use warden_protocol::lf::encode_lf_frame;
/// use warden_rfid::LfReader;
///
/// let (uart, handle) = MockUart::new();
/// let mut reader = LfReader::new(Box::new(uart), 9600)
///     .with_start_wait(Duration::from_millis(50));
/// reader.init().unwrap();
///
/// handle.push_rx(&encode_lf_frame("A1B2C3D4E5").unwrap());
/// assert_eq!(reader.read().unwrap().as_str(), "A1B2C3D4E5");
/// ```
pub struct LfReader {
    uart: BoxedUart,
    baud_rate: u32,
    start_wait: Duration,
    stall_budget: Duration,
}

impl LfReader {
    pub fn new(uart: BoxedUart, baud_rate: u32) -> Self {
        Self {
            uart,
            baud_rate,
            start_wait: Duration::from_millis(MONITOR_WAIT_MS),
            stall_budget: Duration::from_millis(DEFAULT_LF_STALL_BUDGET_MS),
        }
    }

    /// Bound on the wait for the start byte.
    #[must_use]
    pub fn with_start_wait(mut self, wait: Duration) -> Self {
        self.start_wait = wait;
        self
    }

    /// Longest gap tolerated between bytes of one frame.
    #[must_use]
    pub fn with_stall_budget(mut self, budget: Duration) -> Self {
        self.stall_budget = budget;
        self
    }

    fn read_frame(&mut self) -> Result<[u8; LF_FRAME_LENGTH]> {
        let mut frame = [0u8; LF_FRAME_LENGTH];

        if !self.uart.wait_readable(self.start_wait)? {
            return Err(HardwareError::timeout(self.start_wait.as_millis() as u64));
        }
        if self.uart.read_buffer(&mut frame[..1])? == 0 {
            return Err(HardwareError::timeout(self.start_wait.as_millis() as u64));
        }
        if frame[0] != LF_START_BYTE {
            return Err(HardwareError::invalid_data(format!(
                "LF frame begins with {:#04x}",
                frame[0]
            )));
        }

        let mut filled = 1;
        let mut deadline = Instant::now() + self.stall_budget;
        while filled < LF_FRAME_LENGTH {
            let n = self.uart.read_buffer(&mut frame[filled..])?;
            if n > 0 {
                filled += n;
                deadline = Instant::now() + self.stall_budget;
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HardwareError::communication(format!(
                    "LF frame stalled after {filled} of {LF_FRAME_LENGTH} bytes"
                )));
            }
            self.uart.wait_readable(remaining)?;
        }
        Ok(frame)
    }
}

impl Sensor for LfReader {
    type Reading = TagId;

    fn init(&mut self) -> Result<()> {
        self.uart.configure(UartSettings::eight_n_one(self.baud_rate))?;
        self.uart.flush_input()
    }

    fn read(&mut self) -> Result<TagId> {
        let frame = self.read_frame();
        self.uart.flush_input()?;
        let tag = decode_lf_frame(&frame?)?;
        debug!(tag = %tag, "LF tag read");
        Ok(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::thread;
    use warden_hardware::mock::{MockUart, MockUartHandle};
    use warden_protocol::lf::encode_lf_frame;

    fn reader() -> (LfReader, MockUartHandle) {
        let (uart, handle) = MockUart::new();
        let mut reader = LfReader::new(Box::new(uart), 9600)
            .with_start_wait(Duration::from_millis(50))
            .with_stall_budget(Duration::from_millis(30));
        reader.init().unwrap();
        (reader, handle)
    }

    #[test]
    fn test_init_configures_port() {
        let (_reader, handle) = reader();
        assert_eq!(handle.settings(), Some(UartSettings::eight_n_one(9600)));
    }

    #[rstest]
    #[case("0102030405")]
    #[case("A1B2C3D4E5")]
    #[case("0000000000")]
    fn test_read_valid_frame_and_drain_repeat(#[case] tag: &str) {
        let (mut reader, handle) = reader();
        let frame = encode_lf_frame(tag).unwrap();
        handle.push_rx(&frame);
        handle.push_rx(&frame);
        assert_eq!(reader.read().unwrap().as_str(), tag);
        assert_eq!(handle.pending_rx(), 0);
    }

    #[test]
    fn test_no_data_times_out() {
        let (mut reader, _handle) = reader();
        assert!(matches!(reader.read(), Err(HardwareError::Timeout { .. })));
    }

    #[test]
    fn test_noise_before_start_is_flushed() {
        let (mut reader, handle) = reader();
        handle.push_rx(b"xx");
        handle.push_rx(&encode_lf_frame("0102030405").unwrap());
        assert!(matches!(reader.read(), Err(HardwareError::InvalidData { .. })));
        assert_eq!(handle.pending_rx(), 0);
    }

    #[test]
    fn test_bad_checksum_is_protocol_error() {
        let (mut reader, handle) = reader();
        let mut frame = encode_lf_frame("0102030405").unwrap();
        frame[11] = b'F';
        handle.push_rx(&frame);
        assert!(matches!(reader.read(), Err(HardwareError::Protocol(_))));
    }

    #[test]
    fn test_stalled_frame_fails() {
        let (mut reader, handle) = reader();
        let frame = encode_lf_frame("0102030405").unwrap();
        handle.push_rx(&frame[..6]);
        assert!(matches!(
            reader.read(),
            Err(HardwareError::CommunicationError { .. })
        ));
    }

    #[test]
    fn test_slow_frame_within_budget() {
        let (reader, handle) = reader();
        let mut reader = reader.with_stall_budget(Duration::from_millis(150));
        let frame = encode_lf_frame("A1B2C3D4E5").unwrap();
        handle.push_rx(&frame[..5]);
        let feeder = thread::spawn(move || {
            for chunk in frame[5..].chunks(3) {
                thread::sleep(Duration::from_millis(10));
                handle.push_rx(chunk);
            }
        });
        assert_eq!(reader.read().unwrap().as_str(), "A1B2C3D4E5");
        feeder.join().unwrap();
    }
}
