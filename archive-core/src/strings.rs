//! Author and subject strings (§4.7): per message, two offsets into a
//! shared string blob.

use crate::error::Result;
use crate::filemap::FileMap;
use std::path::Path;

/// `meta[2*i]` / `meta[2*i+1]` are the `from` / `subject` offsets for
/// message `i` into the shared `strings` blob.
pub struct Strings {
    meta: FileMap<u32>,
    data: FileMap<u8>,
}

impl Strings {
    pub fn open(strmeta_path: &Path, strings_path: &Path) -> Result<Self> {
        Ok(Self {
            meta: FileMap::open(strmeta_path, false)?,
            data: FileMap::open(strings_path, false)?,
        })
    }

    pub fn from_parts(meta: FileMap<u32>, data: FileMap<u8>) -> Self {
        Self { meta, data }
    }

    pub fn len(&self) -> usize {
        self.meta.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cstr_at(&self, offset: u32) -> &str {
        let bytes = &self.data.as_slice()[offset as usize..];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..end]).unwrap_or_else(|_| {
            tracing::warn!("non-UTF-8 bytes in strings blob at offset {offset}");
            ""
        })
    }

    pub fn from(&self, i: u32) -> &str {
        self.cstr_at(self.meta.as_slice()[i as usize * 2])
    }

    pub fn subject(&self, i: u32) -> &str {
        self.cstr_at(self.meta.as_slice()[i as usize * 2 + 1])
    }
}

/// Builds the `strmeta`/`strings` byte buffers from `(from, subject)` pairs.
pub struct StringsBuilder {
    blob: Vec<u8>,
    meta: Vec<u32>,
}

impl Default for StringsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StringsBuilder {
    pub fn new() -> Self {
        Self {
            blob: Vec::new(),
            meta: Vec::new(),
        }
    }

    pub fn push(&mut self, from: &str, subject: &str) {
        self.meta.push(self.blob.len() as u32);
        self.blob.extend_from_slice(from.as_bytes());
        self.blob.push(0);
        self.meta.push(self.blob.len() as u32);
        self.blob.extend_from_slice(subject.as_bytes());
        self.blob.push(0);
    }

    pub fn build(&self) -> (Vec<u8>, Vec<u8>) {
        let mut meta_bytes = Vec::with_capacity(self.meta.len() * 4);
        for m in &self.meta {
            meta_bytes.extend_from_slice(&m.to_le_bytes());
        }
        (meta_bytes, self.blob.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_and_subject_per_message() {
        let mut builder = StringsBuilder::new();
        builder.push("alice@example.com", "hello world");
        builder.push("bob@example.org", "re: hello world");
        let (meta_bytes, blob_bytes) = builder.build();

        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join("strmeta.bin");
        let data_path = dir.path().join("strings.bin");
        std::fs::write(&meta_path, meta_bytes).unwrap();
        std::fs::write(&data_path, blob_bytes).unwrap();

        let strings = Strings::open(&meta_path, &data_path).unwrap();
        assert_eq!(strings.len(), 2);
        assert_eq!(strings.from(0), "alice@example.com");
        assert_eq!(strings.subject(0), "hello world");
        assert_eq!(strings.from(1), "bob@example.org");
        assert_eq!(strings.subject(1), "re: hello world");
    }
}
