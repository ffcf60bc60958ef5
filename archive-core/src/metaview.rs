//! `MetaView<Meta, Data>`: a meta-offset array plus a data blob, the
//! standard representation for variable-length per-message records
//! (strings, Message-IDs, lexicon words).

use crate::filemap::FileMap;
use std::path::Path;

use crate::error::Result;

/// `meta[i]` is a byte offset into `data`; `&self[i]` returns the data
/// slice starting at that offset, running to the end of the blob (callers
/// that need an explicit length pair `meta[i]` with a second array, as
/// the lexicon's `{dataOffset, dataSize}` records do).
pub struct MetaView {
    meta: FileMap<u32>,
    data: FileMap<u8>,
}

impl MetaView {
    pub fn open(meta_path: &Path, data_path: &Path) -> Result<Self> {
        Ok(Self {
            meta: FileMap::open(meta_path, false)?,
            data: FileMap::open(data_path, false)?,
        })
    }

    pub fn from_parts(meta: FileMap<u32>, data: FileMap<u8>) -> Self {
        Self { meta, data }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    /// Byte offset recorded for entry `i`.
    pub fn offset(&self, i: usize) -> Option<u32> {
        self.meta.get(i).copied()
    }

    /// Data starting at entry `i`'s offset, through the end of the blob.
    /// Use [`slice`](Self::slice) when an explicit length is known.
    pub fn get(&self, i: usize) -> Option<&[u8]> {
        let offset = self.offset(i)? as usize;
        self.data.as_slice().get(offset..)
    }

    /// Data for entry `i`, of exactly `len` bytes.
    pub fn slice(&self, i: usize, len: usize) -> Option<&[u8]> {
        let offset = self.offset(i)? as usize;
        self.data.as_slice().get(offset..offset + len)
    }

    /// `get(i)` interpreted as a NUL-terminated C string, stopping at the
    /// first `\0` byte (or the end of the blob if there is none).
    pub fn get_cstr(&self, i: usize) -> Option<&str> {
        let bytes = self.get(i)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).ok()
    }

    pub fn data_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn write_u32s(path: &Path, values: &[u32]) {
        let mut f = File::create(path).unwrap();
        for v in values {
            f.write_all(&v.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn resolves_offsets_into_shared_blob() {
        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join("meta.bin");
        let data_path = dir.path().join("data.bin");
        write_u32s(&meta_path, &[0, 6, 10]);
        std::fs::write(&data_path, b"alice\0bob\0carol\0").unwrap();

        let view = MetaView::open(&meta_path, &data_path).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(view.get_cstr(0), Some("alice"));
        assert_eq!(view.get_cstr(1), Some("bob"));
        assert_eq!(view.get_cstr(2), Some("carol"));
    }
}
