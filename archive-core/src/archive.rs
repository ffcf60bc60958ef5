//! [`Archive`]: the public façade bundling every on-disk component behind
//! one read-only handle, opened either from a directory of named files or
//! a single package bundle (§6).

use crate::connectivity::Connectivity;
use crate::error::{ArchiveError, Result};
use crate::hashindex::HashIndex;
use crate::lexicon::Lexicon;
use crate::metaview::MetaView;
use crate::package::Package;
use crate::search::{self, SearchFlags, SearchResults};
use crate::store::MessageStore;
use crate::strings::Strings;
use msgid_codec::MsgIdCodec;
use std::path::Path;
use std::sync::Mutex;

/// A fully opened, memory-mapped message archive.
pub struct Archive {
    msgid_codec: MsgIdCodec,
    msgids: MetaView,
    msgid_hash: HashIndex,
    store: MessageStore,
    connectivity: Connectivity,
    strings: Strings,
    lexicon: Lexicon,
    scratch: Mutex<Vec<u8>>,
}

impl Archive {
    /// Opens an archive laid out as a directory of separately named files
    /// (§6.2), the format the build tools write incrementally.
    pub fn open_dir(dir: &Path, codec: ArchiveCodec) -> Result<Self> {
        let p = |name: &str| dir.join(name);
        let msgid_codec = load_msgid_codec(&p("midhosts"))?;
        let msgids = MetaView::open(&p("midmeta"), &p("middata"))?;
        let msgid_hash = HashIndex::open(&p("midhash"), &p("midhashdata"))?;
        let store = match codec {
            ArchiveCodec::Lz4 => MessageStore::open_lz4(&p("zmeta"), &p("zdata"))?,
            ArchiveCodec::Zstd => MessageStore::open_zstd(&p("zmeta"), &p("zdata"), &p("zdict"))?,
        };
        let connectivity = Connectivity::open(&p("connmeta"), &p("conndata"), &p("toplevel"))?;
        let strings = Strings::open(&p("strmeta"), &p("strings"))?;
        let lexicon = Lexicon::open(
            &p("lexmeta_str"),
            &p("lexstr"),
            &p("lexhash"),
            &p("lexhashdata"),
            &p("lexmeta"),
            &p("lexdata"),
            &p("lexhit"),
        )?;

        Ok(Self {
            msgid_codec,
            msgids,
            msgid_hash,
            store,
            connectivity,
            strings,
            lexicon,
            scratch: Mutex::new(Vec::new()),
        })
    }

    /// Opens an archive from a single package bundle file (§6.1).
    pub fn open_package(path: &Path, codec: ArchiveCodec) -> Result<Self> {
        let package = Package::open(path)?;
        let hosts: Vec<String> = String::from_utf8_lossy(package.bytes("midhosts")?)
            .split('\0')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let msgid_codec = MsgIdCodec::with_hosts(hosts);

        let msgids = MetaView::from_parts(package.filemap("midmeta")?, package.filemap("middata")?);
        let msgid_hash = HashIndex::from_parts(package.filemap("midhash")?, package.filemap("midhashdata")?)?;

        let store = match codec {
            ArchiveCodec::Lz4 => MessageStore::Lz4 {
                meta: package.filemap("zmeta")?,
                data: package.filemap("zdata")?,
            },
            ArchiveCodec::Zstd => MessageStore::Zstd {
                meta: package.filemap("zmeta")?,
                data: package.filemap("zdata")?,
                dict: package.bytes("zdict")?.to_vec(),
            },
        };

        let connectivity = Connectivity::from_parts(
            package.filemap("connmeta")?,
            package.filemap("conndata")?,
            package.filemap("toplevel")?,
        );
        let strings = Strings::from_parts(package.filemap("strmeta")?, package.filemap("strings")?);
        let lexicon = Lexicon::open_from_package(&package)?;

        Ok(Self {
            msgid_codec,
            msgids,
            msgid_hash,
            store,
            connectivity,
            strings,
            lexicon,
            scratch: Mutex::new(Vec::new()),
        })
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Decompresses message `i`'s body text using a reusable scratch
    /// buffer; callers needing to hold the result across calls should copy
    /// it out (e.g. `.to_owned()`).
    pub fn get_message(&self, i: u32) -> Result<String> {
        let mut buf = self.scratch.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(self.store.get_message(i, &mut buf)?.to_string())
    }

    pub fn msg_id(&self, i: u32) -> Result<String> {
        let packed = self
            .msgids
            .get(i as usize)
            .ok_or(ArchiveError::MessageNotFound(i, self.len() as u32))?;
        self.msgid_codec.unpack(packed).map_err(ArchiveError::from)
    }

    /// Resolves a Message-ID to its dense archive index, via the packed
    /// form so the hash index's collision check compares bytes, not text.
    ///
    /// `pack()` always terminates its output with `OP_END`, and that
    /// terminator is part of the bytes hashed into `midhash` and stored in
    /// `middata`, so the candidate slice resolved here must include it too.
    pub fn find_by_msg_id(&self, msg_id: &str) -> Result<Option<u32>> {
        let packed = self.msgid_codec.pack(msg_id)?;
        let index_data = self.msgids.data_bytes();
        Ok(self.msgid_hash.lookup(&packed, |off| {
            let bytes = index_data.get(off as usize..)?;
            let end = bytes.iter().position(|&b| b == 0)?;
            Some(&bytes[..=end])
        }))
    }

    pub fn parent(&self, i: u32) -> Result<i32> {
        self.connectivity.parent(i)
    }

    pub fn children(&self, i: u32) -> Result<&[u32]> {
        self.connectivity.children(i)
    }

    pub fn thread_root(&self, i: u32) -> Result<u32> {
        self.connectivity.root(i)
    }

    pub fn toplevel(&self) -> &[u32] {
        self.connectivity.toplevel()
    }

    pub fn date(&self, i: u32) -> Result<u32> {
        self.connectivity.date(i)
    }

    pub fn from(&self, i: u32) -> &str {
        self.strings.from(i)
    }

    pub fn subject(&self, i: u32) -> &str {
        self.strings.subject(i)
    }

    pub fn search(&self, query: &str, flags: SearchFlags) -> SearchResults {
        search::search(&self.lexicon, query, flags)
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }
}

/// Which [`MessageStore`] codec an archive was built with; not recorded in
/// the package header itself since §4.3 treats it as a build-time choice
/// the opener already knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveCodec {
    Lz4,
    Zstd,
}

fn load_msgid_codec(path: &Path) -> Result<MsgIdCodec> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let hosts: Vec<String> = String::from_utf8_lossy(&bytes)
                .split('\0')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            Ok(MsgIdCodec::with_hosts(hosts))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MsgIdCodec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Serializes a host table as NUL-separated strings, the `midhosts` slot
/// format read by [`load_msgid_codec`].
pub fn serialize_hosts(codec: &MsgIdCodec) -> Vec<u8> {
    let mut out = Vec::new();
    for host in codec.hosts().hosts_slice() {
        out.extend_from_slice(host.as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hashindex::HashIndexBuilder;

    /// Builds a `midmeta`/`middata`/`midhash`/`midhashdata` set the same
    /// way the build tool does, then resolves every Message-ID back to its
    /// index through the exact `HashIndex::lookup` + `MetaView` path
    /// `find_by_msg_id` uses.
    #[test]
    fn find_by_msg_id_resolves_packed_keys_with_terminator() {
        let msg_ids = ["a@example.com", "b@example.com", "c@news.example.org"];
        let codec = MsgIdCodec::new();

        let mut meta = Vec::new();
        let mut data = Vec::new();
        let mut builder = HashIndexBuilder::new();
        let mut packed_offsets = Vec::new();
        for (i, id) in msg_ids.iter().enumerate() {
            let packed = codec.pack(id).unwrap();
            meta.extend_from_slice(&(data.len() as u32).to_le_bytes());
            packed_offsets.push(data.len() as u32);
            data.extend_from_slice(&packed);
            builder.insert(packed, i as u32);
        }
        let (hash, hashdata) = builder.build(|i| packed_offsets[i]);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("midmeta"), &meta).unwrap();
        std::fs::write(dir.path().join("middata"), &data).unwrap();
        std::fs::write(dir.path().join("midhash"), &hash).unwrap();
        std::fs::write(dir.path().join("midhashdata"), &hashdata).unwrap();

        let msgids = MetaView::open(&dir.path().join("midmeta"), &dir.path().join("middata")).unwrap();
        let msgid_hash =
            HashIndex::open(&dir.path().join("midhash"), &dir.path().join("midhashdata")).unwrap();

        for (i, id) in msg_ids.iter().enumerate() {
            let packed = codec.pack(id).unwrap();
            let index_data = msgids.data_bytes();
            let found = msgid_hash.lookup(&packed, |off| {
                let bytes = index_data.get(off as usize..)?;
                let end = bytes.iter().position(|&b| b == 0)?;
                Some(&bytes[..=end])
            });
            assert_eq!(found, Some(i as u32), "failed to resolve {id}");
        }

        let packed = codec.pack("missing@example.com").unwrap();
        let index_data = msgids.data_bytes();
        assert_eq!(
            msgid_hash.lookup(&packed, |off| {
                let bytes = index_data.get(off as usize..)?;
                let end = bytes.iter().position(|&b| b == 0)?;
                Some(&bytes[..=end])
            }),
            None
        );
    }
}
