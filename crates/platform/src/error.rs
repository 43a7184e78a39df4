//! Error types for Burrow

use std::fmt;

/// Unified error type for all Burrow operations
#[derive(Debug)]
pub enum BurrowError {
    /// I/O error (unreadable, oversized or truncated files)
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Input is not a recognized or well-formed key file
    Format(String),

    /// Decryption produced inconsistent data, so the passphrase is wrong
    WrongPassphrase(String),

    /// Recognized format, but the key type or algorithm is not implemented
    UnsupportedMethod(String),

    /// Read past the end of a bounded buffer
    UnexpectedEof {
        /// Offset at which the read started
        offset: usize,
        /// Number of bytes requested
        wanted: usize,
        /// Number of bytes left before the limit
        available: usize,
    },

    /// Use of a secure buffer after it was released
    Disposed(&'static str),

    /// Index outside of a fixed-length buffer
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Buffer length
        len: usize,
    },

    /// Channel or tunnel error
    Channel(String),

    /// Protocol error
    Protocol(String),

    /// Security error (signing, key validation)
    Security(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for BurrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BurrowError::Io(e) => write!(f, "IO error: {}", e),
            BurrowError::Config(msg) => write!(f, "Configuration error: {}", msg),
            BurrowError::Format(msg) => write!(f, "Format error: {}", msg),
            BurrowError::WrongPassphrase(msg) => write!(f, "Wrong passphrase: {}", msg),
            BurrowError::UnsupportedMethod(msg) => write!(f, "Unsupported: {}", msg),
            BurrowError::UnexpectedEof {
                offset,
                wanted,
                available,
            } => write!(
                f,
                "Unexpected end of data: wanted {} bytes at offset {}, {} available",
                wanted, offset, available
            ),
            BurrowError::Disposed(what) => write!(f, "{} has already been released", what),
            BurrowError::IndexOutOfRange { index, len } => {
                write!(f, "Index {} out of range for length {}", index, len)
            }
            BurrowError::Channel(msg) => write!(f, "Channel error: {}", msg),
            BurrowError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            BurrowError::Security(msg) => write!(f, "Security error: {}", msg),
            BurrowError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for BurrowError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BurrowError::Io(e) => Some(e),
            BurrowError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BurrowError {
    fn from(err: std::io::Error) -> Self {
        BurrowError::Io(err)
    }
}

impl BurrowError {
    /// Returns true if this error means the passphrase did not decrypt the key.
    pub fn is_wrong_passphrase(&self) -> bool {
        matches!(self, BurrowError::WrongPassphrase(_))
    }
}

/// Result type for Burrow operations
pub type BurrowResult<T> = Result<T, BurrowError>;
