//! Error types for hardware operations.
//!
//! Covers device open failures, I/O against sysfs and character devices,
//! bus transaction failures and out-of-range requests.

/// Result alias used by every HAL call.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Failure of a HAL call or a device driver.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device node could not be opened or has gone away.
    #[error("Device unavailable: {device}")]
    Unavailable { device: String },

    /// No answer within the budget.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Bus or line communication error.
    #[error("Communication error: {message}")]
    CommunicationError { message: String },

    /// Bytes from the device that do not form a valid reply.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// Device rejected its setup sequence.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Requested value outside what the device accepts.
    #[error("Out of range: {message}")]
    OutOfRange { message: String },

    /// Frame-level failure reported by a protocol codec.
    #[error("Protocol error: {0}")]
    Protocol(#[from] warden_core::Error),

    /// I/O against sysfs or a device node.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn unavailable(device: impl Into<String>) -> Self {
        Self::Unavailable {
            device: device.into(),
        }
    }

    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn communication(message: impl Into<String>) -> Self {
        Self::CommunicationError {
            message: message.into(),
        }
    }

    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }
}

impl From<serialport::Error> for HardwareError {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::NoDevice => Self::unavailable(err.description),
            serialport::ErrorKind::Io(kind) => {
                Self::Io(std::io::Error::new(kind, err.description))
            }
            _ => Self::communication(err.description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_error() {
        let error = HardwareError::unavailable("/dev/ttyS1");
        assert!(matches!(error, HardwareError::Unavailable { .. }));
        assert_eq!(error.to_string(), "Device unavailable: /dev/ttyS1");
    }

    #[test]
    fn test_timeout_error() {
        let error = HardwareError::timeout(80);
        assert_eq!(error.to_string(), "Operation timeout after 80ms");
    }

    #[test]
    fn test_out_of_range_error() {
        let error = HardwareError::out_of_range("angle 200");
        assert_eq!(error.to_string(), "Out of range: angle 200");
    }

    #[test]
    fn test_serialport_no_device_maps_to_unavailable() {
        let err = serialport::Error::new(serialport::ErrorKind::NoDevice, "/dev/ttyS9");
        assert!(matches!(
            HardwareError::from(err),
            HardwareError::Unavailable { .. }
        ));
    }
}
