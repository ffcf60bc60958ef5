use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalaxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog JSON error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("archive index {0} out of range (galaxy has {1} archives)")]
    ArchiveNotFound(u16, u16),

    #[error("archive {0} ({1}) is not available on disk")]
    ArchiveUnavailable(u16, String),

    #[error("global message index {0} out of range (galaxy has {1} messages)")]
    MessageNotFound(u32, u32),

    #[error("Message-ID {0:?} not known to this galaxy")]
    UnknownMessageId(String),

    #[error(transparent)]
    Codec(#[from] msgid_codec::Error),

    #[error(transparent)]
    Archive(#[from] archive_core::ArchiveError),
}

pub type Result<T> = std::result::Result<T, GalaxyError>;
