//! Memory-mapped archive format for offline Usenet message storage.
//!
//! An archive bundles a compressed message store, a Message-ID dictionary
//! and hash index, a thread-connectivity graph, author/subject strings,
//! and a full-text inverted index (lexicon) behind one read-only,
//! zero-copy [`Archive`] handle — opened from either a directory of named
//! files or a single package bundle.

pub mod archive;
pub mod connectivity;
pub mod error;
pub mod filemap;
pub mod hashindex;
pub mod heuristics;
pub mod lexicon;
pub mod metaview;
pub mod package;
pub mod search;
pub mod store;
pub mod strings;

pub use archive::{Archive, ArchiveCodec};
pub use error::{ArchiveError, Result};
pub use search::{SearchFlags, SearchHit, SearchResults};
