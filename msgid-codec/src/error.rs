//! Error types for Message-ID compression and the host dictionary

use thiserror::Error;

/// Result type for msgid-codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec error types
#[derive(Error, Debug)]
pub enum Error {
    /// IO error loading or writing a host table
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A byte outside the codec's alphabet was passed to `pack`
    #[error("byte {0:#04x} is not packable (must be 0x20..=0x7e)")]
    InvalidByte(u8),

    /// The host table has reached its 255-host capacity
    #[error("host table is full (255 hosts)")]
    HostTableFull,

    /// A Message-ID failed structural validation
    #[error("malformed message-id: {0}")]
    MalformedMessageId(String),

    /// Host table data was truncated or inconsistent on load
    #[error("truncated host table: expected {expected} bytes, got {actual}")]
    TruncatedData { expected: usize, actual: usize },
}
