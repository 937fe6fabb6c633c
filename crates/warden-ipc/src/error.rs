//! Error types for IPC channels.

/// Result type alias for IPC operations.
pub type Result<T> = std::result::Result<T, IpcError>;

/// Errors that can occur while opening or using a channel.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Channel name rejected before any system call.
    #[error("Invalid channel name: {0}")]
    InvalidName(String),

    /// Attach requested for a channel nobody created.
    #[error("Channel not found: {0}")]
    NotFound(String),

    /// Open or create failed.
    #[error("Failed to open channel {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// An existing channel has a different message size or capacity.
    #[error("Channel {name} exists with message size {actual}, expected {expected}")]
    LayoutMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Non-blocking send on a full channel.
    #[error("Channel {0} is full")]
    Full(String),

    /// Send failed for a reason other than a full queue.
    #[error("Send on {name} failed: {source}")]
    Send {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Receive failed for a reason other than a timeout.
    #[error("Receive on {name} failed: {source}")]
    Receive {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A received message did not have the channel's fixed size.
    #[error("Malformed message on {name}: {actual} bytes, expected {expected}")]
    Malformed {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Message bytes did not decode.
    #[error("Decode error: {0}")]
    Decode(#[from] warden_core::Error),

    /// Unlink of an owned channel failed.
    #[error("Failed to release channel {name}: {source}")]
    Release {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl IpcError {
    /// True for a full channel on `try_send`.
    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }
}
