//! Compressed message body store: dual LZ4 / Zstd codecs over a common
//! `{offset, size, compressed_size}` meta record (§3.4, §4.3).

use crate::error::{ArchiveError, Result};
use crate::filemap::FileMap;
use std::path::Path;

/// Per-message record: byte offset into the compressed blob, uncompressed
/// size, and compressed size. `#[repr(C)]` to match the on-disk layout.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct MessageMeta {
    pub offset: u64,
    pub size: u32,
    pub compressed_size: u32,
}

/// Dual-codec message store, chosen at open time (§9 design note: a sum
/// type, not a trait object, since exactly two codecs ever exist).
pub enum MessageStore {
    Lz4 {
        meta: FileMap<MessageMeta>,
        data: FileMap<u8>,
    },
    Zstd {
        meta: FileMap<MessageMeta>,
        data: FileMap<u8>,
        dict: Vec<u8>,
    },
}

impl MessageStore {
    pub fn open_lz4(meta_path: &Path, data_path: &Path) -> Result<Self> {
        Ok(Self::Lz4 {
            meta: FileMap::open(meta_path, false)?,
            data: FileMap::open(data_path, false)?,
        })
    }

    pub fn open_zstd(meta_path: &Path, data_path: &Path, dict_path: &Path) -> Result<Self> {
        Ok(Self::Zstd {
            meta: FileMap::open(meta_path, false)?,
            data: FileMap::open(data_path, false)?,
            dict: std::fs::read(dict_path)?,
        })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Lz4 { meta, .. } | Self::Zstd { meta, .. } => meta.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, i: u32) -> Result<MessageMeta> {
        let meta = match self {
            Self::Lz4 { meta, .. } | Self::Zstd { meta, .. } => meta,
        };
        meta.get(i as usize)
            .copied()
            .ok_or(ArchiveError::MessageNotFound(i, self.len() as u32))
    }

    /// Raw compressed bytes for message `i`, without decompression.
    pub fn raw(&self, i: u32) -> Result<&[u8]> {
        let rec = self.record(i)?;
        let data = match self {
            Self::Lz4 { data, .. } | Self::Zstd { data, .. } => data,
        };
        data.as_slice()
            .get(rec.offset as usize..rec.offset as usize + rec.compressed_size as usize)
            .ok_or_else(|| ArchiveError::DecompressionError(format!("message {i}: blob out of range")))
    }

    /// Decompress message `i` into `buf`, returning the text as `&str`.
    /// `buf` is caller-owned scratch space so concurrent readers never
    /// share decompression state.
    pub fn get_message<'b>(&self, i: u32, buf: &'b mut Vec<u8>) -> Result<&'b str> {
        let rec = self.record(i)?;
        let raw = self.raw(i)?;
        buf.clear();
        buf.resize(rec.size as usize, 0);
        match self {
            Self::Lz4 { .. } => {
                let decompressed = lz4_flex::block::decompress(raw, rec.size as usize)
                    .map_err(|e| ArchiveError::DecompressionError(e.to_string()))?;
                buf.copy_from_slice(&decompressed);
            }
            Self::Zstd { dict, .. } => {
                let mut decoder = zstd::bulk::Decompressor::with_dictionary(dict)
                    .map_err(|e| ArchiveError::DecompressionError(e.to_string()))?;
                let n = decoder
                    .decompress_to_buffer(raw, buf)
                    .map_err(|e| ArchiveError::DecompressionError(e.to_string()))?;
                if n as u32 != rec.size {
                    return Err(ArchiveError::ChecksumMismatch {
                        expected: rec.size,
                        actual: n as u32,
                    });
                }
            }
        }
        std::str::from_utf8(buf).map_err(|e| ArchiveError::DecompressionError(e.to_string()))
    }
}

/// Compresses a batch of messages with LZ4 and serializes the
/// `meta`/`data` byte buffers.
pub fn build_lz4_store(messages: &[&[u8]]) -> (Vec<u8>, Vec<u8>) {
    let mut meta = Vec::with_capacity(messages.len() * 16);
    let mut data = Vec::new();
    for m in messages {
        let compressed = lz4_flex::block::compress(m);
        let rec = MessageMeta {
            offset: data.len() as u64,
            size: m.len() as u32,
            compressed_size: compressed.len() as u32,
        };
        meta.extend_from_slice(&rec.offset.to_le_bytes());
        meta.extend_from_slice(&rec.size.to_le_bytes());
        meta.extend_from_slice(&rec.compressed_size.to_le_bytes());
        data.extend_from_slice(&compressed);
    }
    (meta, data)
}

/// Compresses a batch of messages with Zstd using a shared dictionary
/// trained on the batch itself, returning `(meta, data, dict)`.
pub fn build_zstd_store(messages: &[&[u8]], level: i32) -> Result<(Vec<u8>, Vec<u8>, Vec<u8>)> {
    // Dictionary training needs enough sample material to find shared
    // substrings; on small batches it errors out, so fall back to no
    // dictionary rather than failing the whole build.
    let dict = if messages.len() > 1 {
        zstd::dict::from_samples(messages, 16 * 1024).unwrap_or_default()
    } else {
        Vec::new()
    };
    let mut compressor = zstd::bulk::Compressor::with_dictionary(level, &dict)
        .map_err(|e| ArchiveError::DecompressionError(e.to_string()))?;
    let mut meta = Vec::with_capacity(messages.len() * 16);
    let mut data = Vec::new();
    for m in messages {
        let compressed = compressor
            .compress(m)
            .map_err(|e| ArchiveError::DecompressionError(e.to_string()))?;
        let rec = MessageMeta {
            offset: data.len() as u64,
            size: m.len() as u32,
            compressed_size: compressed.len() as u32,
        };
        meta.extend_from_slice(&rec.offset.to_le_bytes());
        meta.extend_from_slice(&rec.size.to_le_bytes());
        meta.extend_from_slice(&rec.compressed_size.to_le_bytes());
        data.extend_from_slice(&compressed);
    }
    Ok((meta, data, dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, bytes).unwrap();
        p
    }

    #[test]
    fn lz4_round_trips_messages() {
        let messages: Vec<&[u8]> = vec![b"hello world", b"a second message, a bit longer than the first"];
        let (meta, data) = build_lz4_store(&messages);
        let dir = tempfile::tempdir().unwrap();
        let meta_path = write(dir.path(), "zmeta.bin", &meta);
        let data_path = write(dir.path(), "zdata.bin", &data);
        let store = MessageStore::open_lz4(&meta_path, &data_path).unwrap();
        assert_eq!(store.len(), 2);
        let mut buf = Vec::new();
        assert_eq!(store.get_message(0, &mut buf).unwrap(), "hello world");
        assert_eq!(
            store.get_message(1, &mut buf).unwrap(),
            "a second message, a bit longer than the first"
        );
    }

    #[test]
    fn zstd_round_trips_messages_with_shared_dictionary() {
        let messages: Vec<&[u8]> = vec![
            b"the quick brown fox jumps over the lazy dog",
            b"the quick brown fox jumps over the sleeping cat",
            b"a completely different sentence about archives",
        ];
        let (meta, data, dict) = build_zstd_store(&messages, 3).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let meta_path = write(dir.path(), "zmeta.bin", &meta);
        let data_path = write(dir.path(), "zdata.bin", &data);
        let dict_path = write(dir.path(), "zdict.bin", &dict);
        let store = MessageStore::open_zstd(&meta_path, &data_path, &dict_path).unwrap();
        let mut buf = Vec::new();
        for (i, m) in messages.iter().enumerate() {
            assert_eq!(store.get_message(i as u32, &mut buf).unwrap().as_bytes(), *m);
        }
    }

    #[test]
    fn empty_message_decompresses_to_empty_string() {
        let messages: Vec<&[u8]> = vec![b""];
        let (meta, data) = build_lz4_store(&messages);
        let dir = tempfile::tempdir().unwrap();
        let meta_path = write(dir.path(), "zmeta.bin", &meta);
        let data_path = write(dir.path(), "zdata.bin", &data);
        let store = MessageStore::open_lz4(&meta_path, &data_path).unwrap();
        let mut buf = Vec::new();
        assert_eq!(store.get_message(0, &mut buf).unwrap(), "");
    }
}
