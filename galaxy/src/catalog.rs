//! On-disk catalog format: one JSON document listing every member archive,
//! the galaxy-level Message-ID dictionary, and the indirect-overlay data
//! (§3.6). Galaxy catalogs are metadata-scale (one entry per distinct
//! message across all archives, not message bodies), so unlike the
//! per-archive format this is read whole into memory rather than
//! memory-mapped.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub path: String,
    pub name: String,
    pub description: String,
    pub codec: ArchiveCodecKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveCodecKind {
    Lz4,
    Zstd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalMessage {
    pub msg_id: String,
    /// Archive indices (dense, into `archives`) that contain this message.
    pub groups: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndirectEntry {
    pub global_id: u32,
    pub indirect_parents: Vec<u32>,
    pub indirect_children: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub archives: Vec<ArchiveEntry>,
    /// Galaxy-level Message-ID codec's host dictionary, in insertion order.
    pub hosts: Vec<String>,
    /// One entry per global message index.
    pub messages: Vec<GlobalMessage>,
    /// Sorted by `global_id`; membership is a binary search (§3.6).
    pub indirect: Vec<IndirectEntry>,
}
