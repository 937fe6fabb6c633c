use std::time::{Duration, Instant};
use tracing::{debug, info};
use warden_core::config::TimingConfig;
use warden_core::constants::{
    DEFAULT_FP_DELETE_TIMEOUT_MS, DEFAULT_FP_ENROLL_STEP_TIMEOUT_MS, DEFAULT_FP_MATCH_TIMEOUT_MS,
    FP_FLUSH_RETRIES, FP_FRAME_LENGTH,
};
use warden_hardware::{BoxedUart, HardwareError, Result, Sensor, UartSettings};
use warden_protocol::fingerprint::{AckStatus, FingerprintFrame, MatchOutcome};

/// Response budgets per command class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintTimeouts {
    pub match_timeout: Duration,
    pub enroll_step_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for FingerprintTimeouts {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_millis(DEFAULT_FP_MATCH_TIMEOUT_MS),
            enroll_step_timeout: Duration::from_millis(DEFAULT_FP_ENROLL_STEP_TIMEOUT_MS),
            delete_timeout: Duration::from_millis(DEFAULT_FP_DELETE_TIMEOUT_MS),
        }
    }
}

impl From<&TimingConfig> for FingerprintTimeouts {
    fn from(timing: &TimingConfig) -> Self {
        Self {
            match_timeout: Duration::from_millis(timing.fp_match_timeout_ms),
            enroll_step_timeout: Duration::from_millis(timing.fp_enroll_step_timeout_ms),
            delete_timeout: Duration::from_millis(timing.fp_delete_timeout_ms),
        }
    }
}

/// A successful identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintMatch {
    pub user_id: u16,
    /// Permission stored with the template (1..=3).
    pub level: u8,
}

/// Outcome of one identification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    Matched(FingerprintMatch),
    NoMatch,
}

/// Fingerprint sensor on a serial port.
///
/// # Example
///
/// ```
/// use warden_biometric::{FingerprintReader, MatchResult};
/// use warden_hardware::mock::MockUart;
/// use warden_protocol::fingerprint::{FingerprintFrame, command};
///
/// let (uart, handle) = MockUart::new();
/// handle.set_responder(|_| FingerprintFrame::new(command::MATCH_1N, [0, 0, 0x05]).encode().to_vec());
///
/// let mut reader = FingerprintReader::new(Box::new(uart), 19_200);
/// assert_eq!(reader.match_finger().unwrap(), MatchResult::NoMatch);
/// ```
pub struct FingerprintReader {
    uart: BoxedUart,
    baud_rate: u32,
    timeouts: FingerprintTimeouts,
}

impl FingerprintReader {
    pub fn new(uart: BoxedUart, baud_rate: u32) -> Self {
        Self {
            uart,
            baud_rate,
            timeouts: FingerprintTimeouts::default(),
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: FingerprintTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Discard stale input, retrying while bytes keep arriving.
    fn flush(&mut self) -> Result<()> {
        for _ in 0..FP_FLUSH_RETRIES {
            self.uart.flush_input()?;
            if !self.uart.wait_readable(Duration::ZERO)? {
                break;
            }
        }
        Ok(())
    }

    /// Send `request` and wait up to `timeout` for its 8-byte reply.
    fn transact(&mut self, request: FingerprintFrame, timeout: Duration) -> Result<FingerprintFrame> {
        self.flush()?;
        self.uart.write_all(&request.encode())?;

        let mut reply = [0u8; FP_FRAME_LENGTH];
        let mut filled = 0;
        let deadline = Instant::now() + timeout;
        while filled < FP_FRAME_LENGTH {
            let n = self.uart.read_buffer(&mut reply[filled..])?;
            if n > 0 {
                filled += n;
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(HardwareError::timeout(timeout.as_millis() as u64));
            }
            self.uart.wait_readable(remaining)?;
        }

        let response = FingerprintFrame::decode(&reply)?;
        if response.command != request.command {
            return Err(HardwareError::communication(format!(
                "reply to {:#04x} carries command {:#04x}",
                request.command, response.command
            )));
        }
        Ok(response)
    }

    fn expect_success(response: FingerprintFrame, what: &str) -> Result<()> {
        match response.status() {
            AckStatus::Success => Ok(()),
            status => Err(HardwareError::invalid_data(format!("{what}: {status}"))),
        }
    }

    /// 1:N identification.
    pub fn match_finger(&mut self) -> Result<MatchResult> {
        let response = self.transact(FingerprintFrame::match_one_to_n(), self.timeouts.match_timeout)?;
        let result = match response.match_outcome()? {
            MatchOutcome::Matched { user_id, level } => {
                MatchResult::Matched(FingerprintMatch { user_id, level })
            }
            MatchOutcome::NoMatch => MatchResult::NoMatch,
        };
        debug!(?result, "fingerprint match");
        Ok(result)
    }

    /// Three-step enrollment. Fails as a whole if any step fails.
    pub fn enroll(&mut self, user_id: u16, level: u8) -> Result<()> {
        for step in 1..=3u8 {
            let request = FingerprintFrame::enroll_step(step, user_id, level)?;
            let response = self.transact(request, self.timeouts.enroll_step_timeout)?;
            Self::expect_success(response, &format!("enrollment step {step}"))?;
            debug!(user_id, step, "enrollment step accepted");
        }
        info!(user_id, level, "fingerprint enrolled");
        Ok(())
    }

    /// Remove one stored template.
    pub fn delete_user(&mut self, user_id: u16) -> Result<()> {
        let response = self.transact(FingerprintFrame::delete_user(user_id), self.timeouts.delete_timeout)?;
        Self::expect_success(response, "delete user")?;
        info!(user_id, "fingerprint deleted");
        Ok(())
    }

    /// Number of stored templates.
    pub fn user_count(&mut self) -> Result<u16> {
        let response = self.transact(FingerprintFrame::user_count(), self.timeouts.delete_timeout)?;
        Self::expect_success(response, "user count")?;
        Ok(response.user_id())
    }
}

impl Sensor for FingerprintReader {
    type Reading = MatchResult;

    fn init(&mut self) -> Result<()> {
        self.uart.configure(UartSettings::eight_n_one(self.baud_rate))?;
        let count = self.user_count()?;
        info!(count, "fingerprint sensor ready");
        Ok(())
    }

    fn read(&mut self) -> Result<MatchResult> {
        self.match_finger()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use warden_hardware::mock::{MockUart, MockUartHandle};
    use warden_protocol::fingerprint::command;

    fn fast() -> FingerprintTimeouts {
        FingerprintTimeouts {
            match_timeout: Duration::from_millis(50),
            enroll_step_timeout: Duration::from_millis(50),
            delete_timeout: Duration::from_millis(50),
        }
    }

    fn reader() -> (FingerprintReader, MockUartHandle) {
        let (uart, handle) = MockUart::new();
        (
            FingerprintReader::new(Box::new(uart), 19_200).with_timeouts(fast()),
            handle,
        )
    }

    /// Echo the command with the given P1..P3.
    fn reply_with(handle: &MockUartHandle, params: [u8; 3]) {
        handle.set_responder(move |written| {
            FingerprintFrame::new(written[1], params).encode().to_vec()
        });
    }

    #[test]
    fn test_match_reports_user_and_level() {
        let (mut reader, handle) = reader();
        reply_with(&handle, [0x00, 0x2A, 2]);
        assert_eq!(
            reader.match_finger().unwrap(),
            MatchResult::Matched(FingerprintMatch {
                user_id: 42,
                level: 2
            })
        );
        assert_eq!(handle.writes()[0], FingerprintFrame::match_one_to_n().encode().to_vec());
    }

    #[rstest]
    #[case(0x05)]
    #[case(0x08)]
    fn test_no_match(#[case] status: u8) {
        let (mut reader, handle) = reader();
        reply_with(&handle, [0, 0, status]);
        assert_eq!(reader.match_finger().unwrap(), MatchResult::NoMatch);
    }

    #[test]
    fn test_match_silence_times_out() {
        let (mut reader, _handle) = reader();
        assert!(matches!(reader.match_finger(), Err(HardwareError::Timeout { .. })));
    }

    #[test]
    fn test_corrupt_reply_is_error() {
        let (mut reader, handle) = reader();
        handle.set_responder(|_| vec![0xF5, 0x0C, 0, 1, 1, 0, 0xFF, 0xF5]);
        assert!(matches!(reader.match_finger(), Err(HardwareError::Protocol(_))));
    }

    #[test]
    fn test_stale_input_is_flushed_before_command() {
        let (mut reader, handle) = reader();
        handle.push_rx(&[0xF5, 0x01, 0x02]);
        reply_with(&handle, [0, 0, 5]);
        assert_eq!(reader.match_finger().unwrap(), MatchResult::NoMatch);
        assert!(handle.flush_count() >= 1);
    }

    #[test]
    fn test_enroll_sends_three_steps() {
        let (mut reader, handle) = reader();
        reply_with(&handle, [0, 0, 0]);
        reader.enroll(7, 3).unwrap();
        let commands: Vec<u8> = handle.writes().iter().map(|w| w[1]).collect();
        assert_eq!(commands, vec![command::ADD_1, command::ADD_2, command::ADD_3]);
        assert_eq!(&handle.writes()[2][2..5], &[0, 7, 3]);
    }

    #[test]
    fn test_enroll_stops_at_failed_step() {
        let (mut reader, handle) = reader();
        handle.set_responder(|written| {
            let status = if written[1] == command::ADD_2 { 0x07 } else { 0x00 };
            FingerprintFrame::new(written[1], [0, 0, status]).encode().to_vec()
        });
        assert!(matches!(reader.enroll(7, 3), Err(HardwareError::InvalidData { .. })));
        assert_eq!(handle.writes().len(), 2);
    }

    #[rstest]
    #[case::no_reply(None)]
    #[case::sensor_timeout(Some(0x08))]
    fn test_enroll_aborts_when_step_times_out(#[case] second_step: Option<u8>) {
        let (mut reader, handle) = reader();
        handle.set_responder(move |written| match (written[1], second_step) {
            (command::ADD_2, None) => Vec::new(),
            (command::ADD_2, Some(status)) => {
                FingerprintFrame::new(command::ADD_2, [0, 0, status]).encode().to_vec()
            }
            (cmd, _) => FingerprintFrame::new(cmd, [0, 0, 0]).encode().to_vec(),
        });

        let result = reader.enroll(7, 3);
        match second_step {
            None => assert!(matches!(result, Err(HardwareError::Timeout { .. }))),
            Some(_) => assert!(matches!(result, Err(HardwareError::InvalidData { .. }))),
        }
        let commands: Vec<u8> = handle.writes().iter().map(|w| w[1]).collect();
        assert_eq!(commands, vec![command::ADD_1, command::ADD_2]);
    }

    #[test]
    fn test_delete_user() {
        let (mut reader, handle) = reader();
        reply_with(&handle, [0, 0, 0]);
        reader.delete_user(9).unwrap();
        assert_eq!(handle.writes()[0], FingerprintFrame::delete_user(9).encode().to_vec());
    }

    #[test]
    fn test_init_reads_user_count() {
        let (mut reader, handle) = reader();
        reply_with(&handle, [0x00, 0x03, 0x00]);
        reader.init().unwrap();
        assert_eq!(handle.writes()[0][1], command::USER_COUNT);
    }

    #[test]
    fn test_mismatched_reply_command() {
        let (mut reader, handle) = reader();
        handle.set_responder(|_| FingerprintFrame::new(command::DELETE_USER, [0, 0, 0]).encode().to_vec());
        assert!(matches!(
            reader.match_finger(),
            Err(HardwareError::CommunicationError { .. })
        ));
    }
}
