//! Scriptable serial port.

use crate::error::{HardwareError, Result};
use crate::traits::{Uart, UartSettings};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct UartState {
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    settings: Option<UartSettings>,
    responder: Option<Responder>,
    flushes: usize,
    disconnected: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<UartState>,
    readable: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, UartState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Mock UART.
///
/// Bytes pushed through the handle become readable. An optional responder
/// sees every write and returns bytes to queue as the device's reply.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use warden_hardware::mock::MockUart;
/// use warden_hardware::traits::Uart;
///
/// let (mut uart, handle) = MockUart::new();
/// handle.set_responder(|written| written.iter().rev().copied().collect());
///
/// uart.write_all(&[1, 2, 3]).unwrap();
/// assert!(uart.wait_readable(Duration::from_millis(10)).unwrap());
///
/// let mut buf = [0u8; 8];
/// let n = uart.read_buffer(&mut buf).unwrap();
/// assert_eq!(&buf[..n], &[3, 2, 1]);
/// assert_eq!(handle.writes(), vec![vec![1, 2, 3]]);
/// ```
pub struct MockUart {
    shared: Arc<Shared>,
}

/// Test-side view of a [`MockUart`].
#[derive(Clone)]
pub struct MockUartHandle {
    shared: Arc<Shared>,
}

impl MockUart {
    /// Create a mock and its handle.
    pub fn new() -> (Self, MockUartHandle) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockUartHandle { shared },
        )
    }
}

impl std::fmt::Debug for MockUart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("MockUart")
            .field("rx_pending", &state.rx.len())
            .field("writes", &state.writes.len())
            .finish()
    }
}

impl MockUartHandle {
    /// Make `bytes` readable by the device side.
    pub fn push_rx(&self, bytes: &[u8]) {
        self.shared.lock().rx.extend(bytes);
        self.shared.readable.notify_all();
    }

    /// Install a responder invoked on every write.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        self.shared.lock().responder = Some(Box::new(responder));
    }

    /// Every write seen so far, one entry per `write_buffer` call.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.lock().writes.clone()
    }

    /// Bytes not yet consumed by the device side.
    pub fn pending_rx(&self) -> usize {
        self.shared.lock().rx.len()
    }

    /// Settings from the last `configure` call.
    pub fn settings(&self) -> Option<UartSettings> {
        self.shared.lock().settings
    }

    /// Number of `flush_input` calls.
    pub fn flush_count(&self) -> usize {
        self.shared.lock().flushes
    }

    /// Make every subsequent operation fail.
    pub fn disconnect(&self) {
        self.shared.lock().disconnected = true;
        self.shared.readable.notify_all();
    }
}

impl Uart for MockUart {
    fn configure(&mut self, settings: UartSettings) -> Result<()> {
        let mut state = self.shared.lock();
        if state.disconnected {
            return Err(HardwareError::unavailable("mock uart"));
        }
        state.settings = Some(settings);
        Ok(())
    }

    fn read_buffer(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.shared.lock();
        if state.disconnected {
            return Err(HardwareError::unavailable("mock uart"));
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_buffer(&mut self, data: &[u8]) -> Result<usize> {
        let responder = {
            let mut state = self.shared.lock();
            if state.disconnected {
                return Err(HardwareError::unavailable("mock uart"));
            }
            state.writes.push(data.to_vec());
            state.responder.take()
        };
        // Called unlocked so a responder may drive the handle.
        if let Some(mut respond) = responder {
            let reply = respond(data);
            let mut state = self.shared.lock();
            state.rx.extend(reply);
            state.responder.get_or_insert(respond);
            self.shared.readable.notify_all();
        }
        Ok(data.len())
    }

    fn wait_readable(&mut self, timeout: Duration) -> Result<bool> {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .readable
            .wait_timeout_while(state, timeout, |s| s.rx.is_empty() && !s.disconnected)
            .unwrap_or_else(|e| e.into_inner());
        if state.disconnected {
            return Err(HardwareError::unavailable("mock uart"));
        }
        Ok(!state.rx.is_empty())
    }

    fn flush_input(&mut self) -> Result<()> {
        let mut state = self.shared.lock();
        state.rx.clear();
        state.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_wait_readable_times_out_when_empty() {
        let (mut uart, _handle) = MockUart::new();
        let start = Instant::now();
        assert!(!uart.wait_readable(Duration::from_millis(20)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let (mut uart, handle) = MockUart::new();
        let pusher = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.push_rx(&[0x02]);
        });
        assert!(uart.wait_readable(Duration::from_secs(2)).unwrap());
        pusher.join().unwrap();
    }

    #[test]
    fn test_flush_discards_input() {
        let (mut uart, handle) = MockUart::new();
        handle.push_rx(&[1, 2, 3]);
        uart.flush_input().unwrap();
        assert_eq!(handle.pending_rx(), 0);
        assert_eq!(handle.flush_count(), 1);
    }

    #[test]
    fn test_disconnect_fails_operations() {
        let (mut uart, handle) = MockUart::new();
        handle.disconnect();
        let mut buf = [0u8; 1];
        assert!(uart.read_buffer(&mut buf).is_err());
        assert!(uart.write_buffer(&[1]).is_err());
    }
}
