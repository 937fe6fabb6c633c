//! Bounded IPC channels between the control core and the storage service.
//!
//! - [`queue`]: byte-level queue contract
//! - [`posix`] / [`local`]: kernel and in-process backends
//! - [`wire`] / [`messages`]: fixed-layout message schema
//! - [`channel`] / [`topology`]: typed channels and the channel set

pub mod channel;
pub mod error;
pub mod local;
pub mod messages;
pub mod posix;
pub mod queue;
pub mod topology;
pub mod wire;

pub use channel::Channel;
pub use error::{IpcError, Result};
pub use local::{LocalBroker, LocalQueue};
pub use messages::{
    ActuatorCmd, AuthPayload, AuthResponse, Authorization, Command, DatabaseMsg, DbPayload,
    DbWebResponse,
};
pub use posix::PosixQueue;
pub use queue::{MessageQueue, OpenMode, Received, RecvMode};
pub use topology::{Backend, ChannelSet};
pub use wire::WireMessage;
