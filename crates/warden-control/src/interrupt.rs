//! Interrupt sources.
//!
//! A relay driver turns GPIO edges into real-time signals sent to a
//! registered process:
//!
//! ```text
//!  GPIO edge ──► relay driver ──► SIGRTMIN+line (si_value = pin)
//!                                      │
//!                               sigtimedwait()
//!                                      │
//!                          InterruptEvent { line, pin }
//! ```

use crate::error::{ControlError, Result};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use tracing::info;

/// Physical event classes, in relay signal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptLine {
    RoomReed,
    VaultReed,
    Motion,
    Fingerprint,
    EntryRfid,
    ExitRfid,
}

impl InterruptLine {
    pub const COUNT: usize = 6;

    pub const ALL: [InterruptLine; Self::COUNT] = [
        InterruptLine::RoomReed,
        InterruptLine::VaultReed,
        InterruptLine::Motion,
        InterruptLine::Fingerprint,
        InterruptLine::EntryRfid,
        InterruptLine::ExitRfid,
    ];

    /// Offset from `SIGRTMIN`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Real-time signal number the relay uses for this line.
    pub fn signal(self) -> libc::c_int {
        libc::SIGRTMIN() + self.index() as libc::c_int
    }

    pub fn from_signal(signo: libc::c_int) -> Option<Self> {
        let offset = signo - libc::SIGRTMIN();
        usize::try_from(offset).ok().and_then(Self::from_index)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::RoomReed => "room_reed",
            Self::VaultReed => "vault_reed",
            Self::Motion => "motion",
            Self::Fingerprint => "fingerprint",
            Self::EntryRfid => "entry_rfid",
            Self::ExitRfid => "exit_rfid",
        }
    }
}

impl fmt::Display for InterruptLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One relayed edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptEvent {
    pub line: InterruptLine,
    pub pin: i32,
}

/// Source of interrupt events.
pub trait InterruptBus: Send {
    /// Register with the source. Called once by the dispatcher.
    fn subscribe(&mut self) -> Result<()>;

    /// Next event, or `None` if nothing arrived within `timeout`.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<InterruptEvent>>;
}

/// Boxed bus handed to the dispatcher.
pub type BoxedInterruptBus = Box<dyn InterruptBus>;

const RELAY_IOC_MAGIC: u8 = b'W';
const RELAY_IOC_REGISTER: u8 = 0x01;

nix::ioctl_write_int!(relay_register, RELAY_IOC_MAGIC, RELAY_IOC_REGISTER);

fn interrupt_sigset() -> libc::sigset_t {
    // SAFETY: sigset_t is plain data and sigemptyset initializes it.
    let mut set: libc::sigset_t = unsafe { std::mem::zeroed() };
    unsafe { libc::sigemptyset(&mut set) };
    for line in InterruptLine::ALL {
        // SAFETY: initialized set, valid signal number.
        unsafe { libc::sigaddset(&mut set, line.signal()) };
    }
    set
}

/// Block the relay signals in the calling thread.
///
/// Call from the main thread before any other thread exists: threads
/// inherit the mask, so the signals stay pending until the dispatcher takes
/// them with `sigtimedwait`.
pub fn block_signals() -> Result<()> {
    let set = interrupt_sigset();
    // SAFETY: valid set; old mask not requested.
    let rc = unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()) };
    if rc != 0 {
        return Err(ControlError::interrupt(format!(
            "pthread_sigmask failed: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }
    Ok(())
}

/// Relay driver signals taken with `sigtimedwait`.
pub struct SignalInterruptBus {
    device_path: PathBuf,
    // Held open while registered.
    relay: Option<File>,
    set: libc::sigset_t,
}

impl SignalInterruptBus {
    pub fn new(device_path: impl AsRef<Path>) -> Self {
        Self {
            device_path: device_path.as_ref().to_path_buf(),
            relay: None,
            set: interrupt_sigset(),
        }
    }

    /// Whether the relay device is open and registered.
    pub fn is_registered(&self) -> bool {
        self.relay.is_some()
    }
}

impl InterruptBus for SignalInterruptBus {
    fn subscribe(&mut self) -> Result<()> {
        let device = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device_path)
            .map_err(|e| {
                ControlError::interrupt(format!(
                    "cannot open relay device {}: {e}",
                    self.device_path.display()
                ))
            })?;
        let pid = nix::unistd::getpid().as_raw();
        // SAFETY: open descriptor; the request takes the pid by value.
        unsafe { relay_register(device.as_raw_fd(), pid as nix::sys::ioctl::ioctl_param_type) }
            .map_err(|e| ControlError::interrupt(format!("relay registration failed: {e}")))?;
        info!(device = %self.device_path.display(), pid, "registered with interrupt relay");
        self.relay = Some(device);
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<InterruptEvent>> {
        let ts = libc::timespec {
            tv_sec: timeout.as_secs() as libc::time_t,
            tv_nsec: timeout.subsec_nanos() as _,
        };
        // SAFETY: siginfo_t is plain data filled by the kernel.
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: valid set, out-pointer and timeout.
        let signo = unsafe { libc::sigtimedwait(&self.set, &mut info, &ts) };
        if signo < 0 {
            let err = std::io::Error::last_os_error();
            return match err.raw_os_error() {
                Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(None),
                _ => Err(ControlError::interrupt(format!("sigtimedwait failed: {err}"))),
            };
        }
        let Some(line) = InterruptLine::from_signal(signo) else {
            return Ok(None);
        };
        // SAFETY: the relay queues its signals with a value.
        let pin = unsafe { info.si_value() }.sival_ptr as usize as i32;
        Ok(Some(InterruptEvent { line, pin }))
    }
}

/// In-process bus fed by an [`InterruptInjector`].
#[derive(Debug)]
pub struct ChannelInterruptBus {
    events: Receiver<InterruptEvent>,
}

/// Sending half of a [`ChannelInterruptBus`].
#[derive(Debug, Clone)]
pub struct InterruptInjector {
    events: Sender<InterruptEvent>,
}

impl ChannelInterruptBus {
    pub fn new() -> (Self, InterruptInjector) {
        let (tx, rx) = mpsc::channel();
        (Self { events: rx }, InterruptInjector { events: tx })
    }
}

impl InterruptInjector {
    /// Raise an edge on `line`. Returns false once the bus is gone.
    pub fn fire(&self, line: InterruptLine, pin: i32) -> bool {
        self.events.send(InterruptEvent { line, pin }).is_ok()
    }
}

impl InterruptBus for ChannelInterruptBus {
    fn subscribe(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_event(&mut self, timeout: Duration) -> Result<Option<InterruptEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ControlError::interrupt("interrupt injector dropped"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_numbers_roundtrip() {
        for line in InterruptLine::ALL {
            assert_eq!(InterruptLine::from_signal(line.signal()), Some(line));
        }
        assert_eq!(InterruptLine::from_signal(libc::SIGRTMIN() + 6), None);
        assert_eq!(InterruptLine::from_signal(libc::SIGINT), None);
    }

    #[test]
    fn test_missing_relay_device_fails_subscribe() {
        let mut bus = SignalInterruptBus::new("/nonexistent/warden_irq");
        assert!(matches!(bus.subscribe(), Err(ControlError::Interrupt(_))));
        assert!(!bus.is_registered());
    }

    #[test]
    fn test_channel_bus() {
        let (mut bus, injector) = ChannelInterruptBus::new();
        assert!(bus.next_event(Duration::from_millis(5)).unwrap().is_none());
        assert!(injector.fire(InterruptLine::Motion, 17));
        assert_eq!(
            bus.next_event(Duration::from_millis(5)).unwrap(),
            Some(InterruptEvent {
                line: InterruptLine::Motion,
                pin: 17
            })
        );
        drop(injector);
        assert!(bus.next_event(Duration::from_millis(5)).is_err());
    }
}
