//! Simple error handling for the LDGM erasure codec.
use std::fmt;

/// Main error type for all operations.
#[derive(Debug)]
pub enum Error {
    /// Input/Output related errors
    Io(std::io::Error),

    /// Configuration and parameter validation errors
    Config(String),

    /// A packet buffer could not be allocated
    OutOfMemory(String),

    /// A packet needed to build a parity packet is absent (sequence number)
    MissingPacket(usize),

    /// Malformed or inconsistent coded block
    Format(String),

    /// Parsing errors
    Parse(String),
}

/// Convenience type alias for Results in this crate.
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::OutOfMemory(msg) => write!(f, "Out of memory: {}", msg),
            Self::MissingPacket(seq) => write!(f, "Packet {} is not available", seq),
            Self::Format(msg) => write!(f, "Format error: {}", msg),
            Self::Parse(msg) => write!(f, "Parse error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(error: std::collections::TryReserveError) -> Self {
        Self::OutOfMemory(error.to_string())
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an allocation failure error
    pub fn out_of_memory(msg: impl Into<String>) -> Self {
        Self::OutOfMemory(msg.into())
    }

    /// Create a block format error
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a parsing error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }
}
