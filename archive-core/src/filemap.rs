//! Zero-copy, read-only mapped-file views.
//!
//! [`FileMap<T>`] memory-maps a file (or borrows a byte range of an
//! already-mapped file) and exposes it as `&[T]`. This is the universal
//! leaf of the archive format: every named file in the package (§6.2) is
//! opened as a `FileMap` of the appropriate element type, whether it lives
//! as its own file on disk or as a slice of one combined package bundle.

use crate::error::{ArchiveError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A memory-mapped, read-only view of a byte range as a slice of `T`.
///
/// `T` must be a plain-old-data type with no padding or pointers; callers
/// are responsible for that invariant (the original format is a C struct
/// layout, not something the Rust type system checks automatically).
#[derive(Clone)]
pub struct FileMap<T> {
    mmap: Option<Arc<Mmap>>,
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> FileMap<T> {
    /// Map `path` in its entirety. If the file is empty and `may_be_absent`
    /// is set, an empty view is returned instead of an error — several
    /// package slots (`desc_short`, `desc_long`) are optional.
    pub fn open(path: &Path, may_be_absent: bool) -> Result<Self> {
        let elem_size = std::mem::size_of::<T>().max(1);
        match File::open(path) {
            Ok(file) => {
                let metadata = file.metadata()?;
                let size = metadata.len() as usize;
                if size == 0 {
                    debug!("mapping empty file {:?}", path);
                    return Ok(Self::empty());
                }
                let mmap = unsafe { Mmap::map(&file)? };
                let len = size / elem_size;
                debug!("mapped {:?}: {} bytes, {} elements", path, size, len);
                Ok(Self {
                    mmap: Some(Arc::new(mmap)),
                    offset: 0,
                    len,
                    _marker: PhantomData,
                })
            }
            Err(e) if may_be_absent && e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::empty())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn empty() -> Self {
        Self {
            mmap: None,
            offset: 0,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Wrap an in-memory mapped buffer in full, for tests and standalone
    /// anonymous mappings.
    pub fn from_owned(mmap: Mmap) -> Self {
        Self::from_shared(Arc::new(mmap), 0, None)
    }

    /// Borrow a byte range `[offset, offset+len)` of an already-shared
    /// mapping — how the package reader (§6.1) exposes each named slot of
    /// one combined bundle file without re-mapping it per slot.
    pub fn from_shared(mmap: Arc<Mmap>, offset: usize, byte_len: Option<usize>) -> Self {
        let elem_size = std::mem::size_of::<T>().max(1);
        let available = mmap.len().saturating_sub(offset);
        let byte_len = byte_len.unwrap_or(available).min(available);
        Self {
            mmap: Some(mmap),
            offset,
            len: byte_len / elem_size,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw byte size of the mapped region.
    pub fn byte_len(&self) -> usize {
        self.len * std::mem::size_of::<T>().max(1)
    }

    pub fn bytes(&self) -> &[u8] {
        match &self.mmap {
            Some(mmap) => &mmap[self.offset..self.offset + self.byte_len()],
            None => &[],
        }
    }
}

impl<T: Copy> FileMap<T> {
    /// View the mapped region as `&[T]`.
    ///
    /// # Safety contract
    /// Valid only when the mapped bytes are a well-formed, correctly
    /// aligned array of `T` — true for every use in this crate, since `T`
    /// is always a fixed-size little-endian record type read directly from
    /// the archive's own builder.
    pub fn as_slice(&self) -> &[T] {
        match &self.mmap {
            Some(mmap) => unsafe {
                std::slice::from_raw_parts(mmap[self.offset..].as_ptr().cast::<T>(), self.len)
            },
            None => &[],
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.as_slice().get(index)
    }
}

impl<T> std::fmt::Debug for FileMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMap").field("len", &self.len).finish()
    }
}

/// A validation helper: error out if a mapped file's byte length is not a
/// multiple of `size_of::<T>()`, instead of silently truncating.
pub fn check_alignment<T>(path: &Path, byte_len: usize) -> Result<()> {
    let elem_size = std::mem::size_of::<T>();
    if elem_size > 0 && !byte_len.is_multiple_of(elem_size) {
        return Err(ArchiveError::InvalidPackageFormat(format!(
            "{:?}: size {} is not a multiple of element size {}",
            path, byte_len, elem_size
        )));
    }
    Ok(())
}
