//! Worker units: one OS thread per flow, stopped cooperatively.

use crate::error::{ControlError, Result};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// Scheduling class of a worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Normal,
    /// SCHED_FIFO at this priority (1..=99).
    RealTime(i32),
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::RealTime(priority) => write!(f, "fifo:{priority}"),
        }
    }
}

/// Stop flag observed by a worker body between bounded waits.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

type Body = Box<dyn FnOnce(StopToken) + Send + 'static>;

/// A named thread running one loop body until asked to stop.
///
/// Started at most once. The priority is applied from inside the new thread
/// and reported back before [`start`](Self::start) returns, so a worker that
/// cannot get its real-time class never runs its body.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use warden_control::worker::{Priority, WorkerUnit};
///
/// let mut worker = WorkerUnit::new("ticker", Priority::Normal, |token| {
///     while !token.is_stopped() {
///         std::thread::sleep(Duration::from_millis(5));
///     }
/// });
/// worker.start().unwrap();
/// worker.request_stop();
/// worker.join();
/// assert!(worker.start().is_err());
/// ```
pub struct WorkerUnit {
    name: String,
    priority: Priority,
    body: Option<Body>,
    token: StopToken,
    handle: Option<JoinHandle<()>>,
}

impl WorkerUnit {
    pub fn new(
        name: impl Into<String>,
        priority: Priority,
        body: impl FnOnce(StopToken) + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            body: Some(Box::new(body)),
            token: StopToken::new(),
            handle: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Spawn the thread and wait until it has applied its priority.
    ///
    /// # Errors
    ///
    /// - `ControlError::AlreadyStarted` on a second call
    /// - `ControlError::Spawn` if the thread could not be created
    /// - `ControlError::Scheduling` if the real-time class was refused
    pub fn start(&mut self) -> Result<()> {
        let body = self
            .body
            .take()
            .ok_or_else(|| ControlError::AlreadyStarted(self.name.clone()))?;
        let token = self.token.clone();
        let priority = self.priority;
        let (ready_tx, ready_rx) = mpsc::sync_channel::<io::Result<()>>(1);

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                let applied = apply_priority(priority);
                let proceed = applied.is_ok();
                let _ = ready_tx.send(applied);
                if proceed {
                    body(token);
                }
            })
            .map_err(|source| ControlError::Spawn {
                worker: self.name.clone(),
                source,
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                info!(worker = %self.name, priority = %self.priority, "worker started");
                Ok(())
            }
            Ok(Err(source)) => {
                let _ = handle.join();
                let priority = match self.priority {
                    Priority::RealTime(priority) => priority,
                    Priority::Normal => 0,
                };
                Err(ControlError::Scheduling {
                    worker: self.name.clone(),
                    priority,
                    source,
                })
            }
            Err(_) => {
                let _ = handle.join();
                Err(ControlError::Spawn {
                    worker: self.name.clone(),
                    source: io::Error::other("worker exited before reporting its priority"),
                })
            }
        }
    }

    /// Ask the body to return at its next check.
    pub fn request_stop(&self) {
        self.token.stop();
    }

    pub fn stop_token(&self) -> StopToken {
        self.token.clone()
    }

    /// True while the thread is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Wait for the thread to end. A no-op if it never started or was
    /// already joined.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(worker = %self.name, "worker panicked");
            } else {
                debug!(worker = %self.name, "worker joined");
            }
        }
    }
}

impl Drop for WorkerUnit {
    fn drop(&mut self) {
        self.request_stop();
        self.join();
    }
}

fn apply_priority(priority: Priority) -> io::Result<()> {
    let Priority::RealTime(level) = priority else {
        return Ok(());
    };
    let param = libc::sched_param {
        sched_priority: level,
    };
    // SAFETY: pthread_self is always valid for the calling thread; param
    // outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn test_body_sees_stop() {
        let iterations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&iterations);
        let mut worker = WorkerUnit::new("loop", Priority::Normal, move |token| {
            while !token.is_stopped() {
                counter.fetch_add(1, Ordering::Relaxed);
                thread::sleep(Duration::from_millis(1));
            }
        });
        worker.start().unwrap();
        assert!(worker.is_running());
        thread::sleep(Duration::from_millis(20));
        worker.request_stop();
        worker.join();
        assert!(!worker.is_running());
        assert!(iterations.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_second_start_rejected() {
        let mut worker = WorkerUnit::new("once", Priority::Normal, |_| {});
        worker.start().unwrap();
        worker.join();
        assert!(matches!(worker.start(), Err(ControlError::AlreadyStarted(_))));
    }

    #[test]
    fn test_unavailable_realtime_priority_fails_start() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        // Priority 0 is outside the SCHED_FIFO range on every Linux host.
        let mut worker = WorkerUnit::new("rt", Priority::RealTime(0), move |_| {
            flag.store(true, Ordering::SeqCst);
        });
        assert!(matches!(
            worker.start(),
            Err(ControlError::Scheduling { priority: 0, .. })
        ));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_stops_and_joins() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        {
            let mut worker = WorkerUnit::new("dropped", Priority::Normal, move |token| {
                while !token.is_stopped() {
                    thread::sleep(Duration::from_millis(1));
                }
                flag.store(true, Ordering::SeqCst);
            });
            worker.start().unwrap();
        }
        assert!(finished.load(Ordering::SeqCst));
    }
}
