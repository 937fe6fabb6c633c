//! UHF inventory scanner.

use std::time::{Duration, Instant};
use tracing::{debug, warn};
use warden_core::TagList;
use warden_core::config::TimingConfig;
use warden_core::constants::{
    DEFAULT_UHF_IDLE_WINDOW_MS, DEFAULT_UHF_POLL_SLICE_MS, DEFAULT_UHF_RF_POWER_DBM,
    DEFAULT_UHF_SCAN_WINDOW_MS,
};
use warden_hardware::{BoxedOutputPin, BoxedUart, Result, Sensor, Uart, UartSettings};
use warden_protocol::uhf::{CONTINUOUS_POLL_COUNT, UhfFrame, UhfStreamParser, command};

/// Timing and RF settings of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UhfScanConfig {
    pub poll_slice: Duration,
    pub scan_window: Duration,
    pub idle_window: Duration,
    pub rf_power_dbm: u8,
}

impl Default for UhfScanConfig {
    fn default() -> Self {
        Self {
            poll_slice: Duration::from_millis(DEFAULT_UHF_POLL_SLICE_MS),
            scan_window: Duration::from_millis(DEFAULT_UHF_SCAN_WINDOW_MS),
            idle_window: Duration::from_millis(DEFAULT_UHF_IDLE_WINDOW_MS),
            rf_power_dbm: DEFAULT_UHF_RF_POWER_DBM,
        }
    }
}

impl UhfScanConfig {
    pub fn from_timing(timing: &TimingConfig, rf_power_dbm: u8) -> Self {
        Self {
            poll_slice: Duration::from_millis(timing.uhf_poll_slice_ms),
            scan_window: Duration::from_millis(timing.uhf_scan_window_ms),
            idle_window: Duration::from_millis(timing.uhf_idle_window_ms),
            rf_power_dbm,
        }
    }
}

/// Stops inventory and powers the module down when a scan ends, however it
/// ends.
struct ScanSession<'a> {
    uart: &'a mut dyn Uart,
    enable: &'a mut BoxedOutputPin,
}

impl<'a> ScanSession<'a> {
    fn begin(uart: &'a mut dyn Uart, enable: &'a mut BoxedOutputPin) -> Result<Self> {
        enable.write(true)?;
        Ok(Self { uart, enable })
    }
}

impl Drop for ScanSession<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.uart.write_all(&UhfFrame::stop_inventory().encode()) {
            warn!(error = %e, "failed to stop UHF inventory");
        }
        if let Err(e) = self.enable.write(false) {
            warn!(error = %e, "failed to power down UHF module");
        }
    }
}

/// Scans for every tag in range and returns each EPC once, in first-seen
/// order.
///
/// A scan lasts at most `scan_window` and ends early once `idle_window`
/// passes without a new unique tag.
pub struct UhfReader {
    uart: BoxedUart,
    enable: BoxedOutputPin,
    baud_rate: u32,
    config: UhfScanConfig,
    parser: UhfStreamParser,
}

impl UhfReader {
    pub fn new(uart: BoxedUart, enable: BoxedOutputPin, baud_rate: u32) -> Self {
        Self {
            uart,
            enable,
            baud_rate,
            config: UhfScanConfig::default(),
            parser: UhfStreamParser::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: UhfScanConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one inventory scan.
    pub fn scan(&mut self) -> Result<TagList> {
        let config = self.config;
        let parser = &mut self.parser;
        parser.clear();

        let mut session = ScanSession::begin(self.uart.as_mut(), &mut self.enable)?;
        session.uart.flush_input()?;
        session
            .uart
            .write_all(&UhfFrame::set_rf_power(config.rf_power_dbm).encode())?;
        session
            .uart
            .write_all(&UhfFrame::start_inventory(CONTINUOUS_POLL_COUNT).encode())?;

        let started = Instant::now();
        let mut last_new = started;
        let mut tags = TagList::new();
        let mut chunk = [0u8; 256];

        while started.elapsed() < config.scan_window && last_new.elapsed() < config.idle_window {
            if session.uart.wait_readable(config.poll_slice)? {
                let n = session.uart.read_buffer(&mut chunk)?;
                parser.feed(&chunk[..n]);
            }
            while let Some(parsed) = parser.next_frame() {
                let frame = parsed.frame;
                if frame.is_tag_notification() {
                    match frame.tag_epc() {
                        Ok(tag) if tags.contains(&tag) => {}
                        Ok(tag) if tags.is_full() => {
                            warn!(tag = %tag, capacity = tags.len(), "inventory full, tag dropped");
                        }
                        Ok(tag) => {
                            debug!(tag = %tag, "UHF tag seen");
                            tags.insert_unique(tag)?;
                            last_new = Instant::now();
                        }
                        Err(e) => warn!(error = %e, "unreadable tag notification"),
                    }
                } else if frame.command == command::ERROR {
                    // The module answers each empty inventory round with an
                    // error frame.
                    debug!(payload = ?&frame.payload[..], "UHF error response");
                }
            }
        }

        drop(session);
        debug!(count = tags.len(), elapsed_ms = started.elapsed().as_millis() as u64, "UHF scan finished");
        Ok(tags)
    }
}

impl Sensor for UhfReader {
    type Reading = TagList;

    fn init(&mut self) -> Result<()> {
        self.uart.configure(UartSettings::eight_n_one(self.baud_rate))?;
        self.enable.write(false)
    }

    fn read(&mut self) -> Result<TagList> {
        self.scan()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_hardware::HardwareError;
    use warden_hardware::mock::{MockOutputPin, MockOutputPinHandle, MockUart, MockUartHandle};

    fn fast_config() -> UhfScanConfig {
        UhfScanConfig {
            poll_slice: Duration::from_millis(10),
            scan_window: Duration::from_millis(400),
            idle_window: Duration::from_millis(60),
            rf_power_dbm: 20,
        }
    }

    fn reader() -> (UhfReader, MockUartHandle, MockOutputPinHandle) {
        let (uart, uart_h) = MockUart::new();
        let (pin, pin_h) = MockOutputPin::new();
        let mut reader = UhfReader::new(Box::new(uart), Box::new(pin), 115_200).with_config(fast_config());
        reader.init().unwrap();
        (reader, uart_h, pin_h)
    }

    fn notification(epc: &[u8]) -> Vec<u8> {
        UhfFrame::tag_notification(0xC8, epc).encode().to_vec()
    }

    fn respond_on_start(handle: &MockUartHandle, reply: Vec<u8>) {
        let start = UhfFrame::start_inventory(CONTINUOUS_POLL_COUNT).encode().to_vec();
        handle.set_responder(move |written| {
            if written == start.as_slice() {
                reply.clone()
            } else {
                Vec::new()
            }
        });
    }

    #[test]
    fn test_scan_dedupes_in_first_seen_order() {
        let (mut reader, uart, pin) = reader();
        let mut burst = notification(&[0xE1, 0x00]);
        burst.extend(notification(&[0xE2, 0x00]));
        burst.extend(notification(&[0xE1, 0x00]));
        respond_on_start(&uart, burst);

        let tags = reader.read().unwrap();
        let ids: Vec<&str> = tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(ids, vec!["E100", "E200"]);
        assert_eq!(pin.history(), vec![false, true, false]);
    }

    #[test]
    fn test_scan_command_sequence() {
        let (mut reader, uart, _pin) = reader();
        reader.scan().unwrap();
        let writes = uart.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0], UhfFrame::set_rf_power(20).encode().to_vec());
        assert_eq!(
            writes[1],
            UhfFrame::start_inventory(CONTINUOUS_POLL_COUNT).encode().to_vec()
        );
        assert_eq!(writes[2], UhfFrame::stop_inventory().encode().to_vec());
    }

    #[test]
    fn test_empty_scan_ends_after_idle_window() {
        let (mut reader, _uart, _pin) = reader();
        let start = Instant::now();
        let tags = reader.scan().unwrap();
        assert!(tags.is_empty());
        assert!(start.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_failure_still_powers_down() {
        let (mut reader, uart, pin) = reader();
        // Disconnect after the first write so the scan loop fails mid-way.
        let handle = uart.clone();
        uart.set_responder(move |_| {
            handle.disconnect();
            Vec::new()
        });
        assert!(matches!(reader.scan(), Err(HardwareError::Unavailable { .. })));
        assert_eq!(pin.level(), Some(false));
    }

    #[test]
    fn test_corrupt_checksum_tag_still_counted() {
        let (mut reader, uart, _pin) = reader();
        let mut frame = notification(&[0xAB, 0xCD]);
        let chk = frame.len() - 2;
        frame[chk] ^= 0x55;
        respond_on_start(&uart, frame);
        let tags = reader.scan().unwrap();
        assert_eq!(tags.len(), 1);
    }
}
