//! Cross-archive Message-ID identity, grouping, and thread-warp navigation
//! (§3.6, §4.9): a galaxy is a catalog over a set of archives that may
//! overlap in which messages they hold, letting a reader jump between an
//! archive's local view of a thread and another archive's view of the
//! same thread.

mod catalog;
mod error;

pub use catalog::{ArchiveCodecKind, ArchiveEntry, Catalog, GlobalMessage, IndirectEntry};
pub use error::{GalaxyError, Result};

use archive_core::{Archive, ArchiveCodec};
use msgid_codec::MsgIdCodec;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn to_archive_codec(kind: ArchiveCodecKind) -> ArchiveCodec {
    match kind {
        ArchiveCodecKind::Lz4 => ArchiveCodec::Lz4,
        ArchiveCodecKind::Zstd => ArchiveCodec::Zstd,
    }
}

/// One containing archive's view of a global message, for the "warp"
/// navigation action (§4.9): jump from the archive currently being
/// browsed into another archive that has its own view of the same thread.
#[derive(Debug, Clone, Copy)]
pub struct WarpEntry {
    pub archive: u16,
    /// Distance (in parent hops) from this message to that archive's
    /// thread root.
    pub parent_depth: u32,
    pub direct_children: u32,
    pub total_children: u32,
}

/// A fully loaded galaxy catalog, with archives opened lazily on first
/// access (some may not be present on disk at all).
pub struct Galaxy {
    base_dir: PathBuf,
    codec: MsgIdCodec,
    archives: Vec<ArchiveEntry>,
    opened: Vec<OnceLock<Option<Archive>>>,
    messages: Vec<GlobalMessage>,
    index_by_msg_id: HashMap<String, u32>,
    indirect: HashMap<u32, (Vec<u32>, Vec<u32>)>,
}

impl Galaxy {
    /// Loads a galaxy catalog; `base_dir` resolves archive entries with
    /// relative paths.
    pub fn open(catalog_path: &Path) -> Result<Self> {
        let bytes = std::fs::read(catalog_path)?;
        let catalog: Catalog = serde_json::from_slice(&bytes)?;
        let base_dir = catalog_path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let index_by_msg_id = catalog
            .messages
            .iter()
            .enumerate()
            .map(|(i, m)| (m.msg_id.clone(), i as u32))
            .collect();
        let indirect = catalog
            .indirect
            .iter()
            .map(|e| (e.global_id, (e.indirect_parents.clone(), e.indirect_children.clone())))
            .collect();
        let opened = catalog.archives.iter().map(|_| OnceLock::new()).collect();

        Ok(Self {
            base_dir,
            codec: MsgIdCodec::with_hosts(catalog.hosts),
            archives: catalog.archives,
            opened,
            messages: catalog.messages,
            index_by_msg_id,
            indirect,
        })
    }

    pub fn archive_count(&self) -> u16 {
        self.archives.len() as u16
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn archive_entry(&self, a: u16) -> Result<&ArchiveEntry> {
        self.archives
            .get(a as usize)
            .ok_or(GalaxyError::ArchiveNotFound(a, self.archive_count()))
    }

    fn archive_path(&self, entry: &ArchiveEntry) -> PathBuf {
        let p = Path::new(&entry.path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }

    pub fn is_archive_available(&self, a: u16) -> bool {
        self.archive_entry(a).is_ok_and(|entry| self.archive_path(entry).exists())
    }

    /// Opens (and caches) archive `a`, as either a package file or a
    /// directory of named files.
    pub fn archive(&self, a: u16) -> Result<&Archive> {
        let entry = self.archive_entry(a)?;
        let slot = &self.opened[a as usize];
        let opt = slot.get_or_init(|| {
            let path = self.archive_path(entry);
            let codec = to_archive_codec(entry.codec);
            if path.is_dir() {
                Archive::open_dir(&path, codec).ok()
            } else {
                Archive::open_package(&path, codec).ok()
            }
        });
        opt.as_ref()
            .ok_or_else(|| GalaxyError::ArchiveUnavailable(a, entry.name.clone()))
    }

    pub fn find_by_msg_id(&self, msg_id: &str) -> Option<u32> {
        self.index_by_msg_id.get(msg_id).copied()
    }

    pub fn msg_id(&self, global_index: u32) -> Result<&str> {
        self.messages
            .get(global_index as usize)
            .map(|m| m.msg_id.as_str())
            .ok_or(GalaxyError::MessageNotFound(global_index, self.messages.len() as u32))
    }

    /// Archive indices containing the given global message.
    pub fn groups(&self, global_index: u32) -> Result<&[u16]> {
        self.messages
            .get(global_index as usize)
            .map(|m| m.groups.as_slice())
            .ok_or(GalaxyError::MessageNotFound(global_index, self.messages.len() as u32))
    }

    fn local_index(&self, archive: &Archive, codec: &MsgIdCodec, msg_id: &str) -> Result<Option<u32>> {
        let _ = codec;
        Ok(archive.find_by_msg_id(msg_id)?)
    }

    /// Whether every available containing archive agrees on this message's
    /// parent, compared by Message-ID equality after repacking to the
    /// galaxy codec (§4.9).
    pub fn parents_same(&self, global_index: u32) -> Result<bool> {
        let msg_id = self.msg_id(global_index)?.to_string();
        let mut parent_msg_id: Option<String> = None;
        for &a in self.groups(global_index)? {
            if !self.is_archive_available(a) {
                continue;
            }
            let archive = self.archive(a)?;
            let Some(local_i) = self.local_index(archive, &self.codec, &msg_id)? else {
                continue;
            };
            let parent = match archive.parent(local_i)? {
                archive_core::connectivity::NO_PARENT => None,
                p => Some(archive.msg_id(p as u32)?),
            };
            match &parent_msg_id {
                None => parent_msg_id = Some(parent.unwrap_or_default()),
                Some(existing) => {
                    if *existing != parent.unwrap_or_default() {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    /// Whether every available containing archive agrees on this message's
    /// children, compared by set equality of repacked child Message-IDs.
    pub fn children_same(&self, global_index: u32) -> Result<bool> {
        let msg_id = self.msg_id(global_index)?.to_string();
        let mut reference: Option<std::collections::BTreeSet<String>> = None;
        for &a in self.groups(global_index)? {
            if !self.is_archive_available(a) {
                continue;
            }
            let archive = self.archive(a)?;
            let Some(local_i) = self.local_index(archive, &self.codec, &msg_id)? else {
                continue;
            };
            let children: std::collections::BTreeSet<String> = archive
                .children(local_i)?
                .iter()
                .map(|&c| archive.msg_id(c))
                .collect::<archive_core::Result<_>>()?;
            match &reference {
                None => reference = Some(children),
                Some(existing) => {
                    if *existing != children {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }

    pub fn indirect_parents(&self, global_index: u32) -> &[u32] {
        self.indirect.get(&global_index).map_or(&[], |(p, _)| p.as_slice())
    }

    pub fn indirect_children(&self, global_index: u32) -> &[u32] {
        self.indirect.get(&global_index).map_or(&[], |(_, c)| c.as_slice())
    }

    /// For every available archive containing this message, how deep it
    /// sits in that archive's local thread and how many children it has
    /// there (§4.9).
    pub fn warp(&self, global_index: u32) -> Result<Vec<WarpEntry>> {
        let msg_id = self.msg_id(global_index)?.to_string();
        let mut entries = Vec::new();
        for &a in self.groups(global_index)? {
            if !self.is_archive_available(a) {
                continue;
            }
            let archive = self.archive(a)?;
            let Some(local_i) = self.local_index(archive, &self.codec, &msg_id)? else {
                continue;
            };
            let mut depth = 0u32;
            let mut cur = local_i;
            loop {
                match archive.parent(cur)? {
                    archive_core::connectivity::NO_PARENT => break,
                    p => {
                        cur = p as u32;
                        depth += 1;
                    }
                }
            }
            let direct_children = archive.children(local_i)?.len() as u32;
            entries.push(WarpEntry {
                archive: a,
                parent_depth: depth,
                direct_children,
                total_children: direct_children,
            });
        }
        Ok(entries)
    }
}

/// Builds a [`Catalog`] from a set of archives already opened with
/// [`archive_core::Archive`], assigning global ids to every distinct
/// Message-ID and populating the indirect overlay (§4.9) by matching
/// stripped subjects across archives' thread roots.
pub struct GalaxyBuilder {
    archives: Vec<ArchiveEntry>,
    by_msg_id: indexmap::IndexMap<String, Vec<u16>>,
}

mod indexmap {
    //! Minimal insertion-ordered map, just enough for [`super::GalaxyBuilder`]
    //! to assign stable, deterministic global ids without pulling in the
    //! `indexmap` crate for one use site.
    use std::collections::HashMap;

    #[derive(Default)]
    pub struct IndexMap<K, V> {
        order: Vec<K>,
        index: HashMap<K, usize>,
        values: Vec<V>,
    }

    impl<K: std::hash::Hash + Eq + Clone, V> IndexMap<K, V> {
        pub fn new() -> Self {
            Self { order: Vec::new(), index: HashMap::new(), values: Vec::new() }
        }

        pub fn entry_or_insert_with(&mut self, key: K, default: impl FnOnce() -> V) -> &mut V {
            if let Some(&i) = self.index.get(&key) {
                return &mut self.values[i];
            }
            let i = self.values.len();
            self.index.insert(key.clone(), i);
            self.order.push(key);
            self.values.push(default());
            &mut self.values[i]
        }

        pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
            self.order.iter().map(move |k| (k, &self.values[self.index[k]]))
        }
    }
}

impl Default for GalaxyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GalaxyBuilder {
    pub fn new() -> Self {
        Self { archives: Vec::new(), by_msg_id: indexmap::IndexMap::new() }
    }

    /// Registers archive `a` (its dense index is this call's position) and
    /// records every one of its messages against the galaxy-wide dictionary.
    pub fn add_archive(&mut self, entry: ArchiveEntry, archive: &Archive) {
        let a = self.archives.len() as u16;
        self.archives.push(entry);
        for i in 0..archive.len() as u32 {
            let Ok(msg_id) = archive.msg_id(i) else { continue };
            let groups = self.by_msg_id.entry_or_insert_with(msg_id, Vec::new);
            if !groups.contains(&a) {
                groups.push(a);
            }
        }
    }

    /// Finalizes the galaxy dictionary's hosts, assigns global indices, and
    /// discovers indirect overlay entries (§4.9) among the given archives
    /// (passed again, in the order [`add_archive`](Self::add_archive) was
    /// called, since the builder itself does not retain archive handles).
    pub fn build(self, archives: &[(&ArchiveEntry, &Archive)]) -> Catalog {
        let mut codec = MsgIdCodec::new();
        let mut messages = Vec::with_capacity(self.by_msg_id.iter().count());
        let mut global_id_of: HashMap<String, u32> = HashMap::new();
        for (msg_id, groups) in self.by_msg_id.iter() {
            let host = msg_id.rsplit('@').next().unwrap_or_default();
            let _ = codec.hosts_mut().insert(host);
            global_id_of.insert(msg_id.clone(), messages.len() as u32);
            messages.push(GlobalMessage { msg_id: msg_id.clone(), groups: groups.clone() });
        }

        let indirect = build_indirect_overlay(archives, &global_id_of);

        Catalog {
            archives: self.archives,
            hosts: codec.hosts().hosts_slice().to_vec(),
            messages,
            indirect,
        }
    }
}

/// For every local thread root shared by two or more archives, check
/// whether another archive's root has the same stripped subject (§4.9's
/// documented resolution of "discovered by content similarity") and, if
/// so, link each as the other's indirect parent/child.
fn build_indirect_overlay(
    archives: &[(&ArchiveEntry, &Archive)],
    global_id_of: &HashMap<String, u32>,
) -> Vec<IndirectEntry> {
    use archive_core::heuristics::kill_re;
    use std::collections::BTreeMap;

    struct Root {
        global_id: u32,
        subject: String,
    }

    let mut roots: Vec<Root> = Vec::new();
    for (_, archive) in archives {
        for &local_i in archive.toplevel() {
            let Ok(msg_id) = archive.msg_id(local_i) else { continue };
            let Some(&global_id) = global_id_of.get(&msg_id) else { continue };
            roots.push(Root {
                global_id,
                subject: kill_re(archive.subject(local_i)).trim().to_lowercase(),
            });
        }
    }

    let mut by_subject: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for root in &roots {
        if root.subject.is_empty() {
            continue;
        }
        by_subject.entry(root.subject.clone()).or_default().push(root.global_id);
    }

    let mut overlay: BTreeMap<u32, (Vec<u32>, Vec<u32>)> = BTreeMap::new();
    for ids in by_subject.values() {
        if ids.len() < 2 {
            continue;
        }
        for &id in ids {
            let others: Vec<u32> = ids.iter().copied().filter(|&other| other != id).collect();
            let entry = overlay.entry(id).or_default();
            entry.0.extend(others.iter().copied());
            entry.1.extend(others);
        }
    }

    overlay
        .into_iter()
        .map(|(global_id, (indirect_parents, indirect_children))| IndirectEntry {
            global_id,
            indirect_parents,
            indirect_children,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_a_minimal_catalog_and_resolves_lookups() {
        let catalog = Catalog {
            archives: vec![ArchiveEntry {
                path: "missing-archive".to_string(),
                name: "test".to_string(),
                description: String::new(),
                codec: ArchiveCodecKind::Lz4,
            }],
            hosts: vec!["example.com".to_string()],
            messages: vec![GlobalMessage { msg_id: "a@example.com".to_string(), groups: vec![0] }],
            indirect: vec![IndirectEntry { global_id: 0, indirect_parents: vec![], indirect_children: vec![1] }],
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        std::fs::write(&path, serde_json::to_vec(&catalog).unwrap()).unwrap();

        let galaxy = Galaxy::open(&path).unwrap();
        assert_eq!(galaxy.archive_count(), 1);
        assert_eq!(galaxy.message_count(), 1);
        assert_eq!(galaxy.find_by_msg_id("a@example.com"), Some(0));
        assert_eq!(galaxy.groups(0).unwrap(), &[0]);
        assert_eq!(galaxy.indirect_children(0), &[1]);
        assert!(!galaxy.is_archive_available(0));
    }
}
