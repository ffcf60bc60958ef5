//! Single-file package bundle: one mapped file holding every named archive
//! component, read back via [`FileMap::from_shared`] slices (§6.1, §6.2).

use crate::error::{ArchiveError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

pub const MAGIC: &[u8; 7] = b"\0Usenet";
pub const FORMAT_VERSION: u8 = 1;

/// Slot names, in the fixed order they appear in the package's slot table.
/// `desc_short`/`desc_long` are free-text archive metadata and may be
/// empty; every other slot is load-bearing.
pub const SLOT_NAMES: [&str; 22] = [
    "desc_short",
    "desc_long",
    "conndata",
    "connmeta",
    "lexdata",
    "lexhash",
    "lexhashdata",
    "lexhit",
    "lexmeta",
    "lexmeta_str",
    "lexstr",
    "middata",
    "midmeta",
    "midhash",
    "midhashdata",
    "midhosts",
    "strings",
    "strmeta",
    "toplevel",
    "zdata",
    "zmeta",
    "zdict",
];

const ALIGNMENT: u64 = 8;

fn align_up(n: u64) -> u64 {
    n.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// An opened package: one shared mapping plus the byte range of each slot.
pub struct Package {
    mmap: Arc<Mmap>,
    slots: [(usize, usize); SLOT_NAMES.len()],
}

impl Package {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });
        if mmap.len() < 8 {
            return Err(ArchiveError::InvalidPackageFormat("file too small for header".into()));
        }
        if &mmap[0..7] != MAGIC {
            return Err(ArchiveError::InvalidPackageFormat("bad magic".into()));
        }
        let version = mmap[7];
        if version != FORMAT_VERSION {
            return Err(ArchiveError::VersionMismatch {
                found: version,
                supported: FORMAT_VERSION,
            });
        }

        let table_start = 8usize;
        let table_len = SLOT_NAMES.len() * 16;
        let table = mmap
            .get(table_start..table_start + table_len)
            .ok_or_else(|| ArchiveError::InvalidPackageFormat("truncated slot table".into()))?;

        let mut slots = [(0usize, 0usize); SLOT_NAMES.len()];
        for (i, chunk) in table.chunks_exact(16).enumerate() {
            let offset = u64::from_le_bytes(chunk[0..8].try_into().unwrap()) as usize;
            let len = u64::from_le_bytes(chunk[8..16].try_into().unwrap()) as usize;
            if mmap.get(offset..offset + len).is_none() {
                return Err(ArchiveError::InvalidPackageFormat(format!(
                    "slot {} out of range",
                    SLOT_NAMES[i]
                )));
            }
            slots[i] = (offset, len);
        }

        Ok(Self { mmap, slots })
    }

    fn slot_index(name: &str) -> Result<usize> {
        SLOT_NAMES
            .iter()
            .position(|&s| s == name)
            .ok_or_else(|| ArchiveError::InvalidPackageFormat(format!("unknown slot {name:?}")))
    }

    /// Raw bytes of a named slot.
    pub fn bytes(&self, name: &str) -> Result<&[u8]> {
        let (offset, len) = self.slots[Self::slot_index(name)?];
        Ok(&self.mmap[offset..offset + len])
    }

    /// A [`crate::filemap::FileMap`] sharing this package's mapping, for a
    /// named slot.
    pub fn filemap<T>(&self, name: &str) -> Result<crate::filemap::FileMap<T>> {
        let (offset, len) = self.slots[Self::slot_index(name)?];
        Ok(crate::filemap::FileMap::from_shared(self.mmap.clone(), offset, Some(len)))
    }
}

/// Assembles a package file from named byte buffers, 8-byte-aligning each
/// slot body after the fixed header and slot table.
pub struct PackageWriter {
    slots: std::collections::HashMap<String, Vec<u8>>,
}

impl Default for PackageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageWriter {
    pub fn new() -> Self {
        Self { slots: std::collections::HashMap::new() }
    }

    pub fn set(&mut self, name: &str, bytes: Vec<u8>) -> &mut Self {
        self.slots.insert(name.to_string(), bytes);
        self
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let table_len = (SLOT_NAMES.len() * 16) as u64;
        let mut body_offset = align_up(8 + table_len);

        let mut entries = Vec::with_capacity(SLOT_NAMES.len());
        for name in SLOT_NAMES {
            let len = self.slots.get(name).map_or(0, Vec::len) as u64;
            entries.push((body_offset, len));
            body_offset = align_up(body_offset + len);
        }

        let mut file = File::create(path)?;
        file.write_all(MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        for &(offset, len) in &entries {
            file.write_all(&offset.to_le_bytes())?;
            file.write_all(&len.to_le_bytes())?;
        }

        let mut written = 8 + table_len;
        for (name, &(offset, _)) in SLOT_NAMES.iter().zip(&entries) {
            pad_to(&mut file, &mut written, offset)?;
            if let Some(bytes) = self.slots.get(*name) {
                file.write_all(bytes)?;
                written += bytes.len() as u64;
            }
        }
        Ok(())
    }
}

fn pad_to(file: &mut File, written: &mut u64, target: u64) -> Result<()> {
    if target > *written {
        let padding = vec![0u8; (target - *written) as usize];
        file.write_all(&padding)?;
        *written = target;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_named_slots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.pkg");

        let mut writer = PackageWriter::new();
        writer.set("strings", b"alice\0bob\0".to_vec());
        writer.set("strmeta", vec![0, 0, 0, 0, 6, 0, 0, 0]);
        writer.write(&path).unwrap();

        let package = Package::open(&path).unwrap();
        assert_eq!(package.bytes("strings").unwrap(), b"alice\0bob\0");
        assert_eq!(package.bytes("desc_short").unwrap(), b"");

        let strmeta: crate::filemap::FileMap<u32> = package.filemap("strmeta").unwrap();
        assert_eq!(strmeta.as_slice(), &[0, 6]);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pkg");
        std::fs::write(&path, b"not-a-package-file-at-all").unwrap();
        assert!(Package::open(&path).is_err());
    }
}
