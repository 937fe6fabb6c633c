//! Event monitors: broadcast wake-ups for physical events.
//!
//! A monitor has no memory. [`EventMonitor::signal`] wakes whoever is
//! waiting at that moment; a signal with nobody waiting is lost. Workers
//! therefore re-check hardware after waking where they can.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::interrupt::InterruptLine;

/// Result of [`EventMonitor::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Signaled,
    TimedOut,
}

/// Condition variable paired with a generation counter so that spurious
/// wake-ups are not reported as signals.
///
/// ```
/// use std::time::Duration;
/// use warden_control::monitor::{EventMonitor, WaitOutcome};
///
/// let monitor = EventMonitor::new("demo");
/// monitor.signal(); // nobody waiting: lost
/// assert_eq!(monitor.wait(Duration::from_millis(10)), WaitOutcome::TimedOut);
/// ```
#[derive(Debug)]
pub struct EventMonitor {
    name: &'static str,
    generation: Mutex<u64>,
    cond: Condvar,
}

impl EventMonitor {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            generation: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the next [`signal`](Self::signal) or until `timeout`.
    pub fn wait(&self, timeout: Duration) -> WaitOutcome {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        let start = *generation;
        loop {
            if *generation != start {
                return WaitOutcome::Signaled;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return WaitOutcome::TimedOut;
            }
            generation = self
                .cond
                .wait_timeout(generation, remaining)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
    }

    /// Wake every current waiter.
    pub fn signal(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation = generation.wrapping_add(1);
        self.cond.notify_all();
    }
}

/// One monitor per interrupt line.
#[derive(Debug, Clone)]
pub struct Monitors {
    pub room_reed: Arc<EventMonitor>,
    pub vault_reed: Arc<EventMonitor>,
    pub motion: Arc<EventMonitor>,
    pub fingerprint: Arc<EventMonitor>,
    pub entry_rfid: Arc<EventMonitor>,
    pub exit_rfid: Arc<EventMonitor>,
}

impl Default for Monitors {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitors {
    pub fn new() -> Self {
        Self {
            room_reed: Arc::new(EventMonitor::new("room_reed")),
            vault_reed: Arc::new(EventMonitor::new("vault_reed")),
            motion: Arc::new(EventMonitor::new("motion")),
            fingerprint: Arc::new(EventMonitor::new("fingerprint")),
            entry_rfid: Arc::new(EventMonitor::new("entry_rfid")),
            exit_rfid: Arc::new(EventMonitor::new("exit_rfid")),
        }
    }

    /// The monitor an interrupt line maps to.
    pub fn for_line(&self, line: InterruptLine) -> &EventMonitor {
        match line {
            InterruptLine::RoomReed => &self.room_reed,
            InterruptLine::VaultReed => &self.vault_reed,
            InterruptLine::Motion => &self.motion,
            InterruptLine::Fingerprint => &self.fingerprint,
            InterruptLine::EntryRfid => &self.entry_rfid,
            InterruptLine::ExitRfid => &self.exit_rfid,
        }
    }

    /// Signal every monitor; used at shutdown so no worker sleeps out its
    /// full wait.
    pub fn broadcast_all(&self) {
        for line in InterruptLine::ALL {
            self.for_line(line).signal();
        }
    }
}
