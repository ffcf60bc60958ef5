//! Thread connectivity graph: per-message parent/children plus the
//! `toplevel[]` list of thread roots (§3.3, §4.4).

use crate::error::{ArchiveError, Result};
use crate::filemap::FileMap;
use std::path::Path;

/// `connmeta[i]` is an offset (in `u32` elements) into `conndata` where
/// message `i`'s record begins: `[epoch, parent_as_u32, total_subtree,
/// child_count, children[child_count]]`.
pub struct Connectivity {
    meta: FileMap<u32>,
    data: FileMap<u32>,
    toplevel: FileMap<u32>,
}

/// No parent: this message is a thread root.
pub const NO_PARENT: i32 = -1;

impl Connectivity {
    pub fn open(connmeta_path: &Path, conndata_path: &Path, toplevel_path: &Path) -> Result<Self> {
        Ok(Self {
            meta: FileMap::open(connmeta_path, false)?,
            data: FileMap::open(conndata_path, false)?,
            toplevel: FileMap::open(toplevel_path, false)?,
        })
    }

    pub fn from_parts(meta: FileMap<u32>, data: FileMap<u32>, toplevel: FileMap<u32>) -> Self {
        Self { meta, data, toplevel }
    }

    pub fn len(&self) -> usize {
        self.meta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty()
    }

    fn record(&self, i: u32) -> Result<&[u32]> {
        let offset = *self
            .meta
            .get(i as usize)
            .ok_or(ArchiveError::MessageNotFound(i, self.len() as u32))? as usize;
        self.data
            .as_slice()
            .get(offset..)
            .ok_or_else(|| ArchiveError::MalformedConnectivity(format!("offset {offset} out of range")))
    }

    pub fn date(&self, i: u32) -> Result<u32> {
        Ok(self.record(i)?[0])
    }

    pub fn parent(&self, i: u32) -> Result<i32> {
        Ok(self.record(i)?[1] as i32)
    }

    pub fn total_subtree(&self, i: u32) -> Result<u32> {
        Ok(self.record(i)?[2])
    }

    pub fn children(&self, i: u32) -> Result<&[u32]> {
        let rec = self.record(i)?;
        let count = rec[3] as usize;
        rec.get(4..4 + count)
            .ok_or_else(|| ArchiveError::MalformedConnectivity(format!("truncated children for message {i}")))
    }

    /// Walk parents to the thread root.
    pub fn root(&self, mut i: u32) -> Result<u32> {
        loop {
            match self.parent(i)? {
                NO_PARENT => return Ok(i),
                p => i = p as u32,
            }
        }
    }

    /// Thread roots, in stable display order.
    pub fn toplevel(&self) -> &[u32] {
        self.toplevel.as_slice()
    }

    /// Index range `[i, i + total_subtree(i))`: the thread-layout contract
    /// (§4.10) guarantees this is exactly the subtree rooted at `i`.
    pub fn subtree_range(&self, i: u32) -> Result<std::ops::Range<u32>> {
        Ok(i..i + self.total_subtree(i)?)
    }
}

/// Builds the `connmeta`/`conndata`/`toplevel` byte buffers for a batch of
/// messages, given as `(parent, epoch)` pairs indexed by dense message id.
/// Children are derived from parent links; indices must already be laid
/// out in the depth-first thread order required by §4.10 (the caller's
/// job — this builder only computes total-subtree sizes and serializes).
pub struct ConnectivityBuilder {
    epoch: Vec<u32>,
    parent: Vec<i32>,
}

impl ConnectivityBuilder {
    pub fn new(n: usize) -> Self {
        Self {
            epoch: vec![0; n],
            parent: vec![NO_PARENT; n],
        }
    }

    pub fn set(&mut self, i: usize, epoch: u32, parent: i32) {
        self.epoch[i] = epoch;
        self.parent[i] = parent;
    }

    /// Serialize to `(connmeta, conndata, toplevel)` byte buffers.
    pub fn build(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let n = self.epoch.len();
        let mut children: Vec<Vec<u32>> = vec![Vec::new(); n];
        let mut toplevel = Vec::new();
        for i in 0..n {
            match self.parent[i] {
                NO_PARENT => toplevel.push(i as u32),
                p => children[p as usize].push(i as u32),
            }
        }
        for c in &mut children {
            c.sort_by_key(|&idx| self.epoch[idx as usize]);
        }

        let mut total_subtree = vec![1u32; n];
        // Process in reverse index order: thread-layout contract (§4.10)
        // guarantees a child's index is always greater than its parent's.
        for i in (0..n).rev() {
            for &c in &children[i] {
                total_subtree[i] += total_subtree[c as usize];
            }
        }

        let mut connmeta = Vec::with_capacity(n * 4);
        let mut conndata = Vec::new();
        for i in 0..n {
            connmeta.extend_from_slice(&(conndata.len() as u32 / 4).to_le_bytes());
            conndata.extend_from_slice(&self.epoch[i].to_le_bytes());
            conndata.extend_from_slice(&(self.parent[i] as u32).to_le_bytes());
            conndata.extend_from_slice(&total_subtree[i].to_le_bytes());
            conndata.extend_from_slice(&(children[i].len() as u32).to_le_bytes());
            for &c in &children[i] {
                conndata.extend_from_slice(&c.to_le_bytes());
            }
        }
        let mut toplevel_bytes = Vec::with_capacity(toplevel.len() * 4);
        for t in &toplevel {
            toplevel_bytes.extend_from_slice(&t.to_le_bytes());
        }
        (connmeta, conndata, toplevel_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_from_bytes(connmeta: Vec<u8>, conndata: Vec<u8>, toplevel: Vec<u8>) -> Connectivity {
        let dir = tempfile::tempdir().unwrap();
        let meta_path = dir.path().join("connmeta.bin");
        let data_path = dir.path().join("conndata.bin");
        let top_path = dir.path().join("toplevel.bin");
        std::fs::write(&meta_path, connmeta).unwrap();
        std::fs::write(&data_path, conndata).unwrap();
        std::fs::write(&top_path, toplevel).unwrap();
        Connectivity::open(&meta_path, &data_path, &top_path).unwrap()
    }

    #[test]
    fn builds_a_small_thread() {
        // 0 = root "c@y" (epoch 30), 1 = root "a@x" (epoch 10), 2 = child of 1 "b@x" (epoch 20)
        let mut b = ConnectivityBuilder::new(3);
        b.set(0, 30, NO_PARENT);
        b.set(1, 10, NO_PARENT);
        b.set(2, 20, 1);
        let (meta, data, top) = b.build();
        let conn = open_from_bytes(meta, data, top);

        assert_eq!(conn.len(), 3);
        assert_eq!(conn.parent(2).unwrap(), 1);
        assert_eq!(conn.children(1).unwrap(), &[2]);
        assert_eq!(conn.parent(1).unwrap(), NO_PARENT);
        assert_eq!(conn.total_subtree(1).unwrap(), 2);
        assert_eq!(conn.toplevel(), &[0, 1]);
        assert_eq!(conn.root(2).unwrap(), 1);
    }

    #[test]
    fn invariant_children_point_back_to_parent() {
        let mut b = ConnectivityBuilder::new(5);
        b.set(0, 1, NO_PARENT);
        b.set(1, 2, 0);
        b.set(2, 3, 0);
        b.set(3, 4, 1);
        b.set(4, 5, NO_PARENT);
        let (meta, data, top) = b.build();
        let conn = open_from_bytes(meta, data, top);

        for i in 0..conn.len() as u32 {
            for &c in conn.children(i).unwrap() {
                assert_eq!(conn.parent(c).unwrap(), i as i32);
            }
        }
    }
}
