//! In-process queues registered by name.
//!
//! Same semantics as the POSIX backend without kernel objects: used by tests
//! and by single-process deployments.

use crate::error::{IpcError, Result};
use crate::queue::{MessageQueue, OpenMode, Received, RecvMode, check_length, validate_name};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tracing::debug;

type Registry = Mutex<HashMap<String, Arc<QueueCore>>>;

struct QueueCore {
    size: usize,
    capacity: usize,
    messages: Mutex<VecDeque<Vec<u8>>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl QueueCore {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Name registry for [`LocalQueue`]s.
///
/// Cloning shares the registry.
///
/// # Example
///
/// ```
/// use warden_ipc::local::LocalBroker;
/// use warden_ipc::queue::{MessageQueue, OpenMode, Received, RecvMode};
///
/// let broker = LocalBroker::new();
/// let owner = broker.open("/demo", 2, 4, OpenMode::Owner).unwrap();
/// let peer = broker.open("/demo", 2, 4, OpenMode::Attacher).unwrap();
///
/// owner.send(&[1, 2]).unwrap();
/// let mut buf = [0u8; 2];
/// assert_eq!(peer.receive(&mut buf, RecvMode::Poll).unwrap(), Received::Message(2));
/// assert_eq!(buf, [1, 2]);
/// ```
#[derive(Clone, Default)]
pub struct LocalBroker {
    registry: Arc<Registry>,
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().keys().cloned().collect();
        f.debug_struct("LocalBroker").field("queues", &names).finish()
    }
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<QueueCore>>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a queue. An owner always gets a new, empty queue and replaces
    /// any queue registered under `name`; handles to the old one keep it
    /// alive but no longer share it.
    pub fn open(
        &self,
        name: &str,
        message_size: usize,
        capacity: usize,
        mode: OpenMode,
    ) -> Result<LocalQueue> {
        validate_name(name)?;
        let mut registry = self.lock();
        let core = match mode {
            OpenMode::Owner => {
                if let Some(old) = registry.get(name) {
                    debug!(name, pending = old.lock().len(), "replacing local queue");
                }
                debug!(name, message_size, capacity, "creating local queue");
                let core = Arc::new(QueueCore {
                    size: message_size,
                    capacity: capacity.max(1),
                    messages: Mutex::new(VecDeque::with_capacity(capacity)),
                    not_empty: Condvar::new(),
                    not_full: Condvar::new(),
                });
                registry.insert(name.to_string(), Arc::clone(&core));
                core
            }
            OpenMode::Attacher => {
                let Some(core) = registry.get(name) else {
                    return Err(IpcError::NotFound(name.to_string()));
                };
                if core.size != message_size {
                    return Err(IpcError::LayoutMismatch {
                        name: name.to_string(),
                        expected: message_size,
                        actual: core.size,
                    });
                }
                Arc::clone(core)
            }
        };
        Ok(LocalQueue {
            name: name.to_string(),
            core,
            owner: mode == OpenMode::Owner,
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Remove `name` from the registry. Missing names are fine.
    pub fn unlink(&self, name: &str) {
        if self.lock().remove(name).is_some() {
            debug!(name, "local queue unlinked");
        }
    }

    /// True if a queue is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }
}

/// Handle to an in-process queue.
pub struct LocalQueue {
    name: String,
    core: Arc<QueueCore>,
    owner: bool,
    registry: Weak<Registry>,
}

impl std::fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalQueue")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .finish()
    }
}

impl LocalQueue {
    /// Messages currently queued.
    pub fn len(&self) -> usize {
        self.core.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_size(&self, message: &[u8]) -> Result<()> {
        check_length(&self.name, self.core.size, message.len())
    }
}

impl MessageQueue for LocalQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn message_size(&self) -> usize {
        self.core.size
    }

    fn capacity(&self) -> usize {
        self.core.capacity
    }

    fn send(&self, message: &[u8]) -> Result<()> {
        self.check_size(message)?;
        let queue = self.core.lock();
        let mut queue = self
            .core
            .not_full
            .wait_while(queue, |q| q.len() >= self.core.capacity)
            .unwrap_or_else(|e| e.into_inner());
        queue.push_back(message.to_vec());
        self.core.not_empty.notify_one();
        Ok(())
    }

    fn try_send(&self, message: &[u8]) -> Result<()> {
        self.check_size(message)?;
        let mut queue = self.core.lock();
        if queue.len() >= self.core.capacity {
            return Err(IpcError::Full(self.name.clone()));
        }
        queue.push_back(message.to_vec());
        self.core.not_empty.notify_one();
        Ok(())
    }

    fn receive(&self, buf: &mut [u8], mode: RecvMode) -> Result<Received> {
        let mut queue = self.core.lock();
        match mode {
            RecvMode::Blocking => {
                queue = self
                    .core
                    .not_empty
                    .wait_while(queue, |q| q.is_empty())
                    .unwrap_or_else(|e| e.into_inner());
            }
            RecvMode::Timeout(timeout) => {
                let deadline = Instant::now() + timeout;
                while queue.is_empty() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Ok(Received::TimedOut);
                    }
                    queue = self
                        .core
                        .not_empty
                        .wait_timeout(queue, remaining)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
            }
            RecvMode::Poll => {}
        }
        let Some(message) = queue.pop_front() else {
            return Ok(Received::TimedOut);
        };
        self.core.not_full.notify_one();
        drop(queue);

        if buf.len() < message.len() {
            return Err(IpcError::Malformed {
                name: self.name.clone(),
                expected: buf.len(),
                actual: message.len(),
            });
        }
        buf[..message.len()].copy_from_slice(&message);
        Ok(Received::Message(message.len()))
    }

    fn release(&self) -> Result<()> {
        if !self.owner {
            return Ok(());
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
            // Only drop the entry if it is still this queue.
            if registry
                .get(&self.name)
                .is_some_and(|core| Arc::ptr_eq(core, &self.core))
            {
                registry.remove(&self.name);
                debug!(name = %self.name, "local queue released");
            }
        }
        Ok(())
    }
}
