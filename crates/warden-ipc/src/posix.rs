//! POSIX message queues.
//!
//! Queues are opened blocking; timed and polled operations use the
//! `mq_timed*` calls with an absolute `CLOCK_REALTIME` deadline.

use crate::error::{IpcError, Result};
use crate::queue::{MessageQueue, OpenMode, Received, RecvMode, check_length, validate_name};
use std::ffi::CString;
use std::io;
use std::time::Duration;
use tracing::{debug, warn};

/// Handle to a kernel message queue.
#[derive(Debug)]
pub struct PosixQueue {
    name: String,
    c_name: CString,
    mqd: libc::mqd_t,
    size: usize,
    capacity: usize,
    owner: bool,
}

fn realtime_deadline(timeout: Duration) -> libc::timespec {
    let mut now = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: valid out-pointer; CLOCK_REALTIME always exists.
    unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) };

    let mut sec = now.tv_sec as i64 + timeout.as_secs() as i64;
    let mut nsec = now.tv_nsec as i64 + i64::from(timeout.subsec_nanos());
    if nsec >= 1_000_000_000 {
        sec += 1;
        nsec -= 1_000_000_000;
    }
    libc::timespec {
        tv_sec: sec as libc::time_t,
        tv_nsec: nsec as _,
    }
}

impl PosixQueue {
    /// Open `name`. Owners create a new, empty queue with `capacity`
    /// messages of `message_size` bytes, replacing any queue of that name;
    /// attachers require it to exist.
    pub fn open(name: &str, message_size: usize, capacity: usize, mode: OpenMode) -> Result<Self> {
        validate_name(name)?;
        let c_name = CString::new(name).map_err(|_| IpcError::InvalidName(name.to_string()))?;
        if mode == OpenMode::Owner {
            // Messages left by an earlier run belong to requests nobody waits for.
            Self::unlink(name)?;
        }

        // SAFETY: mq_attr is plain data; zeroed covers the private padding.
        let mut attr: libc::mq_attr = unsafe { std::mem::zeroed() };
        attr.mq_maxmsg = capacity as libc::c_long;
        attr.mq_msgsize = message_size as libc::c_long;

        let mqd = match mode {
            // SAFETY: valid C string; mode and attr follow the variadic contract.
            OpenMode::Owner => unsafe {
                libc::mq_open(
                    c_name.as_ptr(),
                    libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                    0o660 as libc::mode_t,
                    &mut attr as *mut libc::mq_attr,
                )
            },
            // SAFETY: valid C string.
            OpenMode::Attacher => unsafe { libc::mq_open(c_name.as_ptr(), libc::O_RDWR) },
        };
        if mqd == -1 as libc::mqd_t {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::NotFound {
                return Err(IpcError::NotFound(name.to_string()));
            }
            return Err(IpcError::Open {
                name: name.to_string(),
                source: err,
            });
        }

        let queue = Self {
            name: name.to_string(),
            c_name,
            mqd,
            size: message_size,
            capacity,
            owner: mode == OpenMode::Owner,
        };

        // A queue left over from an earlier run keeps its original layout.
        let mut actual: libc::mq_attr = unsafe { std::mem::zeroed() };
        // SAFETY: open descriptor, valid out-pointer.
        if unsafe { libc::mq_getattr(queue.mqd, &mut actual) } == 0
            && actual.mq_msgsize as usize != message_size
        {
            return Err(IpcError::LayoutMismatch {
                name: name.to_string(),
                expected: message_size,
                actual: actual.mq_msgsize as usize,
            });
        }
        debug!(name, message_size, capacity, owner = queue.owner, "message queue opened");
        Ok(queue)
    }

    /// Remove a queue name regardless of ownership. Missing names are fine.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = CString::new(name).map_err(|_| IpcError::InvalidName(name.to_string()))?;
        // SAFETY: valid C string.
        if unsafe { libc::mq_unlink(c_name.as_ptr()) } == -1 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(IpcError::Release {
                    name: name.to_string(),
                    source: err,
                });
            }
        }
        Ok(())
    }

    fn send_with(&self, message: &[u8], deadline: Option<libc::timespec>) -> Result<()> {
        check_length(&self.name, self.size, message.len())?;
        loop {
            let rc = match deadline {
                // SAFETY: open descriptor; buffer valid for its length.
                None => unsafe {
                    libc::mq_send(self.mqd, message.as_ptr().cast(), message.len(), 0)
                },
                // SAFETY: as above, plus a valid timespec.
                Some(ref ts) => unsafe {
                    libc::mq_timedsend(self.mqd, message.as_ptr().cast(), message.len(), 0, ts)
                },
            };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => {
                    return Err(IpcError::Full(self.name.clone()));
                }
                _ => {
                    return Err(IpcError::Send {
                        name: self.name.clone(),
                        source: err,
                    });
                }
            }
        }
    }
}

impl MessageQueue for PosixQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn message_size(&self) -> usize {
        self.size
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.send_with(message, None)
    }

    fn try_send(&self, message: &[u8]) -> Result<()> {
        self.send_with(message, Some(realtime_deadline(Duration::ZERO)))
    }

    fn receive(&self, buf: &mut [u8], mode: RecvMode) -> Result<Received> {
        if buf.len() < self.size {
            return Err(IpcError::Malformed {
                name: self.name.clone(),
                expected: self.size,
                actual: buf.len(),
            });
        }
        let deadline = match mode {
            RecvMode::Blocking => None,
            RecvMode::Timeout(timeout) => Some(realtime_deadline(timeout)),
            RecvMode::Poll => Some(realtime_deadline(Duration::ZERO)),
        };
        loop {
            let rc = match deadline {
                // SAFETY: open descriptor; buffer holds at least mq_msgsize bytes.
                None => unsafe {
                    libc::mq_receive(self.mqd, buf.as_mut_ptr().cast(), buf.len(), std::ptr::null_mut())
                },
                // SAFETY: as above, plus a valid timespec.
                Some(ref ts) => unsafe {
                    libc::mq_timedreceive(
                        self.mqd,
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                        std::ptr::null_mut(),
                        ts,
                    )
                },
            };
            if rc >= 0 {
                let len = rc as usize;
                check_length(&self.name, self.size, len)?;
                return Ok(Received::Message(len));
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::ETIMEDOUT) | Some(libc::EAGAIN) => return Ok(Received::TimedOut),
                _ => {
                    return Err(IpcError::Receive {
                        name: self.name.clone(),
                        source: err,
                    });
                }
            }
        }
    }

    fn release(&self) -> Result<()> {
        if !self.owner {
            return Ok(());
        }
        // SAFETY: valid C string.
        if unsafe { libc::mq_unlink(self.c_name.as_ptr()) } == -1 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(IpcError::Release {
                    name: self.name.clone(),
                    source: err,
                });
            }
        }
        debug!(name = %self.name, "message queue unlinked");
        Ok(())
    }
}

impl Drop for PosixQueue {
    fn drop(&mut self) {
        // SAFETY: descriptor opened in `open` and closed only here.
        if unsafe { libc::mq_close(self.mqd) } == -1 {
            warn!(name = %self.name, error = %io::Error::last_os_error(), "mq_close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(name: &str) -> String {
        format!("/warden_test_{name}_{}", std::process::id())
    }

    /// Kernel queues may be unavailable in sandboxes; skip quietly there.
    fn open_owner(name: &str, size: usize) -> Option<PosixQueue> {
        match PosixQueue::open(name, size, 4, OpenMode::Owner) {
            Ok(queue) => Some(queue),
            Err(IpcError::Open { source, .. }) => {
                eprintln!("skipping: mq_open unavailable: {source}");
                None
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_roundtrip_and_timeout() {
        let name = unique("roundtrip");
        let Some(owner) = open_owner(&name, 8) else {
            return;
        };
        let peer = PosixQueue::open(&name, 8, 4, OpenMode::Attacher).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(peer.receive(&mut buf, RecvMode::Poll).unwrap(), Received::TimedOut);
        assert_eq!(
            peer.receive(&mut buf, RecvMode::Timeout(Duration::from_millis(20)))
                .unwrap(),
            Received::TimedOut
        );

        owner.send(&[7; 8]).unwrap();
        assert_eq!(peer.receive(&mut buf, RecvMode::Blocking).unwrap(), Received::Message(8));
        assert_eq!(buf, [7; 8]);

        owner.release().unwrap();
        assert!(matches!(
            PosixQueue::open(&name, 8, 4, OpenMode::Attacher),
            Err(IpcError::NotFound(_))
        ));
    }

    #[test]
    fn test_try_send_full() {
        let name = unique("full");
        let Some(owner) = open_owner(&name, 2) else {
            return;
        };
        for _ in 0..4 {
            owner.try_send(&[1, 2]).unwrap();
        }
        assert!(owner.try_send(&[1, 2]).unwrap_err().is_full());
        owner.release().unwrap();
    }

    #[test]
    fn test_wrong_length_send_rejected() {
        let name = unique("len");
        let Some(owner) = open_owner(&name, 4) else {
            return;
        };
        assert!(matches!(owner.send(&[1, 2]), Err(IpcError::Malformed { .. })));
        owner.release().unwrap();
    }

    #[test]
    fn test_owner_open_discards_leftover_queue() {
        let name = unique("leftover");
        let Some(crashed) = open_owner(&name, 4) else {
            return;
        };
        crashed.send(&[9; 4]).unwrap();
        // Closed without release, as after a crash.
        drop(crashed);

        let owner = open_owner(&name, 4).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(owner.receive(&mut buf, RecvMode::Poll).unwrap(), Received::TimedOut);
        owner.release().unwrap();
    }

    #[test]
    fn test_invalid_name() {
        assert!(matches!(
            PosixQueue::open("no_slash", 4, 1, OpenMode::Owner),
            Err(IpcError::InvalidName(_))
        ));
    }
}
