//! Open, bucketed hash index from a string key to a dense `u32` value.
//!
//! On disk: `hash[HashSize]` maps `xxh32(key) & mask` to a byte offset into
//! `hashdata`; each bucket is `{count: u32; (str_offset: u32, value: u32) ×
//! count}` where `str_offset` indexes into a separate string blob. This is
//! the structure behind both the Message-ID index and the lexicon's word
//! index (§4.2, §4.8).

use crate::error::{ArchiveError, Result};
use crate::filemap::FileMap;
use std::path::Path;
use xxhash_rust::xxh32::xxh32;

pub struct HashIndex {
    hash: FileMap<u32>,
    hashdata: FileMap<u8>,
    mask: u32,
}

impl HashIndex {
    pub fn open(hash_path: &Path, hashdata_path: &Path) -> Result<Self> {
        let hash = FileMap::<u32>::open(hash_path, false)?;
        let hashdata = FileMap::<u8>::open(hashdata_path, false)?;
        Self::from_parts(hash, hashdata)
    }

    pub fn from_parts(hash: FileMap<u32>, hashdata: FileMap<u8>) -> Result<Self> {
        let size = hash.len();
        if size == 0 || !size.is_power_of_two() {
            return Err(ArchiveError::InvalidPackageFormat(format!(
                "hash index bucket count {size} must be a non-zero power of two"
            )));
        }
        Ok(Self {
            hash,
            hashdata,
            mask: size as u32 - 1,
        })
    }

    /// Look up `key` against `resolve_strings`, the blob bucket entries'
    /// `str_offset`s index into (the Message-ID table's data blob, or the
    /// lexicon string table's data blob).
    pub fn lookup<'a>(&'a self, key: &[u8], resolve: impl Fn(u32) -> Option<&'a [u8]>) -> Option<u32> {
        let bucket_index = xxh32(key, 0) & self.mask;
        let bucket_offset = *self.hash.as_slice().get(bucket_index as usize)? as usize;
        let data = self.hashdata.as_slice();
        let count = u32::from_le_bytes(data.get(bucket_offset..bucket_offset + 4)?.try_into().ok()?);
        let mut pos = bucket_offset + 4;
        for _ in 0..count {
            let str_offset = u32::from_le_bytes(data.get(pos..pos + 4)?.try_into().ok()?);
            let value = u32::from_le_bytes(data.get(pos + 4..pos + 8)?.try_into().ok()?);
            pos += 8;
            if resolve(str_offset).is_some_and(|candidate| candidate == key) {
                return Some(value);
            }
        }
        None
    }

    pub fn bucket_count(&self) -> usize {
        self.hash.len()
    }
}

/// Picks the smallest power-of-two bucket count keeping load factor <= 0.75,
/// the build-time sizing policy referenced in §4.2.
pub fn pick_bucket_count(entry_count: usize) -> usize {
    let mut buckets = 16usize;
    while (entry_count as f64) / (buckets as f64) > 0.75 {
        buckets *= 2;
    }
    buckets
}

/// In-memory builder for a [`HashIndex`], used by the archive build tools.
/// Produces the exact on-disk bucket layout `HashIndex` reads back.
#[derive(Default)]
pub struct HashIndexBuilder {
    entries: Vec<(Vec<u8>, u32)>,
}

impl HashIndexBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: Vec<u8>, value: u32) {
        self.entries.push((key, value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize into `(hash, hashdata)` byte buffers, with `str_offset`
    /// values resolved against `string_offset`, a caller-supplied function
    /// mapping an entry index to its offset in the shared string blob.
    pub fn build(&self, string_offset: impl Fn(usize) -> u32) -> (Vec<u8>, Vec<u8>) {
        let bucket_count = pick_bucket_count(self.entries.len());
        let mask = bucket_count as u32 - 1;

        let mut buckets: Vec<Vec<(u32, u32)>> = vec![Vec::new(); bucket_count];
        for (i, (key, value)) in self.entries.iter().enumerate() {
            let b = (xxh32(key, 0) & mask) as usize;
            buckets[b].push((string_offset(i), *value));
        }

        let mut hashdata = Vec::new();
        let mut hash = Vec::with_capacity(bucket_count);
        for bucket in &buckets {
            hash.push(hashdata.len() as u32);
            hashdata.extend_from_slice(&(bucket.len() as u32).to_le_bytes());
            for (str_offset, value) in bucket {
                hashdata.extend_from_slice(&str_offset.to_le_bytes());
                hashdata.extend_from_slice(&value.to_le_bytes());
            }
        }

        let mut hash_bytes = Vec::with_capacity(hash.len() * 4);
        for h in hash {
            hash_bytes.extend_from_slice(&h.to_le_bytes());
        }
        (hash_bytes, hashdata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_bucket_count_keeps_load_factor_bounded() {
        assert_eq!(pick_bucket_count(0), 16);
        assert_eq!(pick_bucket_count(10), 16);
        assert_eq!(pick_bucket_count(13), 32);
        assert!(pick_bucket_count(1000) >= 1024);
    }

    #[test]
    fn builder_round_trips_through_hash_index() {
        let keys: Vec<&[u8]> = vec![b"alice@example.com", b"bob@example.org", b"carol@test.net"];
        let mut blob = Vec::new();
        let mut offsets = Vec::new();
        for k in &keys {
            offsets.push(blob.len() as u32);
            blob.extend_from_slice(k);
        }

        let mut builder = HashIndexBuilder::new();
        for (i, k) in keys.iter().enumerate() {
            builder.insert(k.to_vec(), i as u32);
        }
        let (hash_bytes, hashdata_bytes) = builder.build(|i| offsets[i]);

        let dir = tempfile::tempdir().unwrap();
        let hash_path = dir.path().join("hash.bin");
        let hashdata_path = dir.path().join("hashdata.bin");
        std::fs::write(&hash_path, &hash_bytes).unwrap();
        std::fs::write(&hashdata_path, &hashdata_bytes).unwrap();

        let index = HashIndex::open(&hash_path, &hashdata_path).unwrap();
        for (i, k) in keys.iter().enumerate() {
            let found = index.lookup(k, |off| blob.get(off as usize..off as usize + k.len()));
            assert_eq!(found, Some(i as u32));
        }
        assert_eq!(index.lookup(b"missing@nowhere", |off| blob.get(off as usize..)), None);
    }
}
