//! Error types for archive reading and building

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("message index {0} out of range (archive has {1} messages)")]
    MessageNotFound(u32, u32),

    #[error("word {0:?} not found in lexicon")]
    WordNotFound(String),

    #[error("invalid package format: {0}")]
    InvalidPackageFormat(String),

    #[error("unsupported package version {found} (this reader supports up to {supported})")]
    VersionMismatch { found: u8, supported: u8 },

    #[error("decompressed size mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("decompression failed: {0}")]
    DecompressionError(String),

    #[error("codec error: {0}")]
    Codec(#[from] msgid_codec::Error),

    #[error("malformed connectivity graph: {0}")]
    MalformedConnectivity(String),

    #[error("malformed lexicon data: {0}")]
    MalformedLexicon(String),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
