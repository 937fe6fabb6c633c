//! Error types for the control core.

use warden_hardware::HardwareError;
use warden_ipc::IpcError;

/// Result type alias for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The worker thread could not obtain its real-time priority.
    #[error("Worker {worker}: failed to set SCHED_FIFO priority {priority}: {source}")]
    Scheduling {
        worker: String,
        priority: i32,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to create the worker thread.
    #[error("Worker {worker}: failed to spawn thread: {source}")]
    Spawn {
        worker: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` called on a worker that already ran.
    #[error("Worker {0} already started")]
    AlreadyStarted(String),

    #[error("Invalid flow transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Interrupt bus error: {0}")]
    Interrupt(String),

    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    #[error(transparent)]
    Core(#[from] warden_core::Error),
}

impl ControlError {
    pub fn interrupt(message: impl Into<String>) -> Self {
        Self::Interrupt(message.into())
    }
}
