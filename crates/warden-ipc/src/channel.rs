//! Typed channels over a [`MessageQueue`].

use crate::error::{IpcError, Result};
use crate::queue::{MessageQueue, Received, RecvMode};
use crate::wire::WireMessage;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Bounded channel carrying one message type.
///
/// Cloning shares the underlying queue handle.
///
/// # Example
///
/// ```
/// use warden_core::ActuatorId;
/// use warden_ipc::{Channel, LocalBroker, OpenMode};
/// use warden_ipc::messages::ActuatorCmd;
///
/// let broker = LocalBroker::new();
/// let channel: Channel<ActuatorCmd> = Channel::local(&broker, "/act", 4, OpenMode::Owner).unwrap();
///
/// channel.send(&ActuatorCmd::new(ActuatorId::Fan, 1)).unwrap();
/// assert_eq!(channel.try_recv().unwrap(), Some(ActuatorCmd::new(ActuatorId::Fan, 1)));
/// assert_eq!(channel.try_recv().unwrap(), None);
/// ```
pub struct Channel<M> {
    queue: Arc<dyn MessageQueue>,
    _message: PhantomData<fn() -> M>,
}

impl<M> Clone for Channel<M> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            _message: PhantomData,
        }
    }
}

impl<M> fmt::Debug for Channel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.queue.name())
            .field("message_size", &self.queue.message_size())
            .finish()
    }
}

impl<M: WireMessage> Channel<M> {
    /// Wrap a queue whose message size must equal `M::SIZE`.
    pub fn new(queue: Arc<dyn MessageQueue>) -> Result<Self> {
        if queue.message_size() != M::SIZE {
            return Err(IpcError::LayoutMismatch {
                name: queue.name().to_string(),
                expected: M::SIZE,
                actual: queue.message_size(),
            });
        }
        Ok(Self {
            queue,
            _message: PhantomData,
        })
    }

    /// Open on an in-process broker.
    pub fn local(
        broker: &crate::local::LocalBroker,
        name: &str,
        capacity: usize,
        mode: crate::queue::OpenMode,
    ) -> Result<Self> {
        Self::new(Arc::new(broker.open(name, M::SIZE, capacity, mode)?))
    }

    /// Open a POSIX message queue.
    pub fn posix(name: &str, capacity: usize, mode: crate::queue::OpenMode) -> Result<Self> {
        Self::new(Arc::new(crate::posix::PosixQueue::open(
            name, M::SIZE, capacity, mode,
        )?))
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Send, waiting while the channel is full.
    pub fn send(&self, message: &M) -> Result<()> {
        self.queue.send(&message.encode())
    }

    /// Send or fail with [`IpcError::Full`].
    pub fn try_send(&self, message: &M) -> Result<()> {
        self.queue.try_send(&message.encode())
    }

    /// Receive, waiting as long as it takes.
    pub fn recv(&self) -> Result<M> {
        loop {
            if let Some(message) = self.recv_with(RecvMode::Blocking)? {
                return Ok(message);
            }
        }
    }

    /// Receive within `timeout`; `None` when nothing arrived.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<M>> {
        self.recv_with(RecvMode::Timeout(timeout))
    }

    /// Receive without waiting.
    pub fn try_recv(&self) -> Result<Option<M>> {
        self.recv_with(RecvMode::Poll)
    }

    fn recv_with(&self, mode: RecvMode) -> Result<Option<M>> {
        let mut buf = vec![0u8; M::SIZE];
        match self.queue.receive(&mut buf, mode)? {
            Received::Message(len) => Ok(Some(M::decode(&buf[..len])?)),
            Received::TimedOut => Ok(None),
        }
    }

    /// Remove the channel's name if this process owns it.
    pub fn release(&self) -> Result<()> {
        self.queue.release()
    }
}
