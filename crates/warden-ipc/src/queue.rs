//! Byte-level queue contract shared by the POSIX and in-process backends.

use crate::error::{IpcError, Result};
use std::time::Duration;

/// How a queue is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a new, empty queue, replacing any left under the name; the
    /// owner removes it on release.
    Owner,
    /// Open an existing queue.
    Attacher,
}

/// Receive behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvMode {
    /// Wait until a message arrives.
    Blocking,
    /// Wait at most this long.
    Timeout(Duration),
    /// Return immediately.
    Poll,
}

/// Outcome of a receive that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Received {
    /// A message of this many bytes was copied into the buffer.
    Message(usize),
    /// Nothing arrived within the receive mode's budget.
    TimedOut,
}

/// Named, bounded FIFO of fixed-size messages.
///
/// Every message has exactly [`MessageQueue::message_size`] bytes.
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    fn message_size(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Enqueue, waiting while the queue is full.
    fn send(&self, message: &[u8]) -> Result<()>;

    /// Enqueue or fail with [`IpcError::Full`].
    fn try_send(&self, message: &[u8]) -> Result<()>;

    /// Dequeue into `buf`, which must hold at least `message_size` bytes.
    fn receive(&self, buf: &mut [u8], mode: RecvMode) -> Result<Received>;

    /// Remove the queue's name if this handle owns it. Attachers do nothing.
    fn release(&self) -> Result<()>;
}

/// Validate a queue name: a leading `/`, no other `/`, non-empty.
///
/// ```
/// use warden_ipc::queue::validate_name;
///
/// assert!(validate_name("/warden_db").is_ok());
/// assert!(validate_name("warden_db").is_err());
/// assert!(validate_name("/a/b").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<()> {
    let valid = name.len() > 1
        && name.starts_with('/')
        && !name[1..].contains('/')
        && !name.contains('\0');
    if valid {
        Ok(())
    } else {
        Err(IpcError::InvalidName(name.to_string()))
    }
}

pub(crate) fn check_length(name: &str, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(IpcError::Malformed {
            name: name.to_string(),
            expected,
            actual,
        })
    }
}
