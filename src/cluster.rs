// src/cluster.rs
//
// Data cluster allocation and the logical -> physical cluster translator.
//
// Logical index layout for an inode, with P = cluster_size / 4:
//   [0, 5)              direct[i]
//   [5, 5+P)            indirect1 -> P pointers
//   [5+P, 5+P+P*P)      indirect2 -> P pointers -> P pointers each

use log::trace;

use crate::disk::{InodeDisk, PointerBlock, DIRECT_LINKS, NULL_CLUSTER};
use crate::error::{FsError, Result};
use crate::fs::ZosFilesystem;

/// Where a logical cluster index lives inside an inode's pointer tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterSlot {
    Direct(usize),
    Indirect(usize),
    DoubleIndirect { outer: usize, inner: usize },
    /// Past the largest file an inode can describe.
    OutOfRange,
}

impl ClusterSlot {
    pub fn locate(index: u32, ptrs_per_cluster: u32) -> Self {
        let p = ptrs_per_cluster as u64;
        let mut i = index as u64;

        if i < DIRECT_LINKS as u64 {
            return ClusterSlot::Direct(i as usize);
        }
        i -= DIRECT_LINKS as u64;

        if i < p {
            return ClusterSlot::Indirect(i as usize);
        }
        i -= p;

        if i < p * p {
            return ClusterSlot::DoubleIndirect {
                outer: (i / p) as usize,
                inner: (i % p) as usize,
            };
        }
        ClusterSlot::OutOfRange
    }
}

/// Every cluster reachable from one inode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OwnedClusters {
    pub data: Vec<u32>,
    /// indirect1, indirect2 and the second-level blocks under indirect2.
    pub pointers: Vec<u32>,
}

impl OwnedClusters {
    pub fn all(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().chain(self.pointers.iter()).copied()
    }
}

impl ZosFilesystem {
    // -------------------- allocation --------------------

    /// Claims the lowest free data cluster. Cluster 0 is never returned.
    pub fn alloc_cluster(&mut self) -> Result<u32> {
        self.data_bitmap.alloc(&mut self.store)
    }

    pub fn free_cluster(&mut self, cluster: u32) -> Result<()> {
        self.data_bitmap.free(&mut self.store, cluster)
    }

    fn check_cluster_id(&self, cluster: u32) -> Result<()> {
        if cluster == NULL_CLUSTER || cluster >= self.superblock.cluster_count {
            return Err(FsError::InvalidId(cluster));
        }
        Ok(())
    }

    // -------------------- raw cluster I/O --------------------

    pub fn read_cluster(&self, cluster: u32) -> Result<Vec<u8>> {
        self.check_cluster_id(cluster)?;
        let mut buf = vec![0u8; self.superblock.cluster_size as usize];
        self.store
            .read_bytes(self.superblock.cluster_offset(cluster), &mut buf)?;
        Ok(buf)
    }

    /// Writes a whole cluster; shorter input is zero padded.
    pub fn write_cluster(&mut self, cluster: u32, data: &[u8]) -> Result<()> {
        self.check_cluster_id(cluster)?;
        let size = self.superblock.cluster_size as usize;
        if data.len() > size {
            return Err(FsError::InvalidArgument(format!(
                "{} bytes do not fit in a {} byte cluster",
                data.len(),
                size
            )));
        }
        let offset = self.superblock.cluster_offset(cluster);
        if data.len() == size {
            return self.store.write_bytes(offset, data);
        }
        let mut buf = vec![0u8; size];
        buf[..data.len()].copy_from_slice(data);
        self.store.write_bytes(offset, &buf)
    }

    fn read_pointer_block(&self, cluster: u32) -> Result<PointerBlock> {
        Ok(PointerBlock::from_bytes(&self.read_cluster(cluster)?))
    }

    fn write_pointer_block(&mut self, cluster: u32, block: &PointerBlock) -> Result<()> {
        self.write_cluster(cluster, &block.to_bytes())
    }

    fn alloc_pointer_cluster(&mut self) -> Result<u32> {
        let cluster = self.alloc_cluster()?;
        let zeros = PointerBlock::zeroed(self.superblock.pointers_per_cluster() as usize);
        self.write_pointer_block(cluster, &zeros)?;
        trace!("allocated pointer cluster {}", cluster);
        Ok(cluster)
    }

    fn store_pointer(&mut self, block_cluster: u32, slot: usize, cluster: u32) -> Result<()> {
        let mut block = self.read_pointer_block(block_cluster)?;
        block.set(slot, cluster)?;
        self.write_pointer_block(block_cluster, &block)
    }

    // -------------------- translation --------------------

    /// Physical cluster behind logical `index`, or 0 when that part of the
    /// file is not populated.
    pub fn get_file_cluster(&self, inode: &InodeDisk, index: u32) -> Result<u32> {
        let slot = ClusterSlot::locate(index, self.superblock.pointers_per_cluster());
        let cluster = match slot {
            ClusterSlot::Direct(i) => inode.direct[i],
            ClusterSlot::Indirect(i) => {
                if inode.indirect1 == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                self.read_pointer_block(inode.indirect1)?
                    .get(i)
                    .unwrap_or(NULL_CLUSTER)
            }
            ClusterSlot::DoubleIndirect { outer, inner } => {
                if inode.indirect2 == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                let level2 = self
                    .read_pointer_block(inode.indirect2)?
                    .get(outer)
                    .unwrap_or(NULL_CLUSTER);
                if level2 == NULL_CLUSTER {
                    return Ok(NULL_CLUSTER);
                }
                self.read_pointer_block(level2)?
                    .get(inner)
                    .unwrap_or(NULL_CLUSTER)
            }
            ClusterSlot::OutOfRange => NULL_CLUSTER,
        };
        Ok(cluster)
    }

    /// Points logical `index` at `cluster`, allocating missing pointer
    /// clusters on the way. The inode is updated in memory only; the caller
    /// writes it. Pointer clusters allocated before a failure stay attached.
    pub fn set_file_cluster(&mut self, inode: &mut InodeDisk, index: u32, cluster: u32) -> Result<()> {
        if cluster >= self.superblock.cluster_count {
            return Err(FsError::InvalidId(cluster));
        }
        let slot = ClusterSlot::locate(index, self.superblock.pointers_per_cluster());
        trace!("inode {}: logical {} ({:?}) -> {}", inode.id, index, slot, cluster);

        match slot {
            ClusterSlot::Direct(i) => {
                inode.direct[i] = cluster;
                Ok(())
            }
            ClusterSlot::Indirect(i) => {
                if inode.indirect1 == NULL_CLUSTER {
                    if cluster == NULL_CLUSTER {
                        return Ok(());
                    }
                    inode.indirect1 = self.alloc_pointer_cluster()?;
                }
                self.store_pointer(inode.indirect1, i, cluster)
            }
            ClusterSlot::DoubleIndirect { outer, inner } => {
                if inode.indirect2 == NULL_CLUSTER {
                    if cluster == NULL_CLUSTER {
                        return Ok(());
                    }
                    inode.indirect2 = self.alloc_pointer_cluster()?;
                }
                let mut outer_block = self.read_pointer_block(inode.indirect2)?;
                let mut level2 = outer_block.get(outer).unwrap_or(NULL_CLUSTER);
                if level2 == NULL_CLUSTER {
                    if cluster == NULL_CLUSTER {
                        return Ok(());
                    }
                    level2 = self.alloc_pointer_cluster()?;
                    outer_block.set(outer, level2)?;
                    self.write_pointer_block(inode.indirect2, &outer_block)?;
                }
                self.store_pointer(level2, inner, cluster)
            }
            ClusterSlot::OutOfRange => Err(FsError::FileTooLarge),
        }
    }

    /// Walks the whole pointer tree, not just the range covered by `size`.
    pub fn owned_clusters(&self, inode: &InodeDisk) -> Result<OwnedClusters> {
        self.walk_clusters(inode, false)
    }

    /// Like [`owned_clusters`](Self::owned_clusters), but a pointer cluster
    /// outside the data region is listed without being followed.
    pub fn reachable_clusters(&self, inode: &InodeDisk) -> Result<OwnedClusters> {
        self.walk_clusters(inode, true)
    }

    fn walk_clusters(&self, inode: &InodeDisk, lenient: bool) -> Result<OwnedClusters> {
        let follow = |cluster: u32| -> Result<Option<PointerBlock>> {
            if lenient && self.check_cluster_id(cluster).is_err() {
                return Ok(None);
            }
            self.read_pointer_block(cluster).map(Some)
        };

        let mut owned = OwnedClusters::default();
        owned
            .data
            .extend(inode.direct.iter().copied().filter(|&c| c != NULL_CLUSTER));

        if inode.indirect1 != NULL_CLUSTER {
            owned.pointers.push(inode.indirect1);
            if let Some(block) = follow(inode.indirect1)? {
                owned.data.extend(block.live());
            }
        }

        if inode.indirect2 != NULL_CLUSTER {
            owned.pointers.push(inode.indirect2);
            if let Some(outer) = follow(inode.indirect2)? {
                for level2 in outer.live() {
                    owned.pointers.push(level2);
                    if let Some(block) = follow(level2)? {
                        owned.data.extend(block.live());
                    }
                }
            }
        }
        Ok(owned)
    }

    /// Clears every slot of the outer double-indirect block that points at
    /// one of `blocks`, so those second-level clusters can be freed.
    pub(crate) fn detach_level2_blocks(&mut self, inode: &InodeDisk, blocks: &[u32]) -> Result<()> {
        if inode.indirect2 == NULL_CLUSTER || blocks.is_empty() {
            return Ok(());
        }
        let mut outer = self.read_pointer_block(inode.indirect2)?;
        let mut changed = false;
        for slot in 0..self.superblock.pointers_per_cluster() as usize {
            match outer.get(slot) {
                Some(level2) if level2 != NULL_CLUSTER && blocks.contains(&level2) => {
                    outer.set(slot, NULL_CLUSTER)?;
                    changed = true;
                }
                _ => {}
            }
        }
        if changed {
            self.write_pointer_block(inode.indirect2, &outer)?;
        }
        Ok(())
    }

    /// Frees every cluster the inode owns and clears its pointers and size.
    /// The inode is not written.
    pub fn release_clusters(&mut self, inode: &mut InodeDisk) -> Result<()> {
        let owned = self.owned_clusters(inode)?;
        for cluster in owned.all() {
            self.free_cluster(cluster)?;
        }
        inode.direct = [NULL_CLUSTER; DIRECT_LINKS];
        inode.indirect1 = NULL_CLUSTER;
        inode.indirect2 = NULL_CLUSTER;
        inode.size = 0;
        trace!("inode {}: released {} clusters", inode.id, owned.data.len() + owned.pointers.len());
        Ok(())
    }
}
