use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Wire format errors
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    #[error("Invalid command code: {0}")]
    InvalidCommandCode(u8),

    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    // Domain value errors
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid actuator id: {0}")]
    InvalidActuator(u8),

    #[error("Invalid access level: {0}")]
    InvalidAccessLevel(u8),

    #[error("Invalid log type: {0}")]
    InvalidLogType(u8),

    #[error("{what} capacity of {capacity} exceeded")]
    CapacityExceeded { what: &'static str, capacity: usize },

    // Timing errors
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
