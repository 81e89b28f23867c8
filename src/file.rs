// src/file.rs
//
// Whole-file operations. Each one either completes or undoes the
// allocations it made before returning the error.

use log::{debug, warn};

use crate::cluster::OwnedClusters;
use crate::disk::{validate_name, InodeDisk, NULL_CLUSTER};
use crate::error::{FsError, NodeKind, Result};
use crate::fs::ZosFilesystem;

/// What `info` reports about a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub ino: u32,
    pub inode: InodeDisk,
    pub clusters: OwnedClusters,
}

impl ZosFilesystem {
    /// Largest byte size an inode can record.
    pub fn max_storable_size(&self) -> u64 {
        self.superblock.max_file_size().min(u32::MAX as u64)
    }

    fn read_file_inode(&self, id: u32) -> Result<InodeDisk> {
        let inode = self.read_inode(id)?;
        if inode.is_directory {
            return Err(FsError::TypeMismatch(NodeKind::File));
        }
        Ok(inode)
    }

    /// Allocates, attaches and fills one cluster per chunk of `data`,
    /// starting at logical index `first`.
    fn fill_clusters(&mut self, inode: &mut InodeDisk, first: u32, data: &[u8]) -> Result<()> {
        let cluster_size = self.superblock.cluster_size as usize;
        for (i, chunk) in data.chunks(cluster_size).enumerate() {
            let cluster = self.alloc_cluster()?;
            if let Err(e) = self.set_file_cluster(inode, first + i as u32, cluster) {
                if let Err(undo) = self.free_cluster(cluster) {
                    warn!("inode {}: could not free cluster {}: {}", inode.id, cluster, undo);
                }
                return Err(e);
            }
            self.write_cluster(cluster, chunk)?;
        }
        Ok(())
    }

    /// Drops a half-built inode: its clusters and its id.
    fn discard_inode(&mut self, id: u32, inode: &mut InodeDisk) {
        if let Err(e) = self.release_clusters(inode) {
            warn!("inode {}: rollback could not release clusters: {}", id, e);
        }
        if let Err(e) = self.free_inode(id) {
            warn!("inode {}: rollback could not free inode: {}", id, e);
        }
    }

    /// Creates `path` holding `data`.
    pub fn create_file(&mut self, path: &str, data: &[u8]) -> Result<u32> {
        let (parent, name) = self.split_path(path)?;
        let id = self.create_file_in(parent, &name, data)?;
        debug!("created {:?} (inode {}, {} bytes)", path, id, data.len());
        Ok(id)
    }

    fn create_file_in(&mut self, parent: u32, name: &str, data: &[u8]) -> Result<u32> {
        validate_name(name)?;
        match self.find_in_dir(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }
        if data.len() as u64 > self.max_storable_size() {
            return Err(FsError::FileTooLarge);
        }

        let id = self.alloc_inode()?;
        let mut inode = InodeDisk::file(id, parent);
        let built = self.build_file(id, &mut inode, parent, name, data);
        if let Err(e) = built {
            self.discard_inode(id, &mut inode);
            return Err(e);
        }
        Ok(id)
    }

    fn build_file(
        &mut self,
        id: u32,
        inode: &mut InodeDisk,
        parent: u32,
        name: &str,
        data: &[u8],
    ) -> Result<()> {
        self.fill_clusters(inode, 0, data)?;
        inode.size = data.len() as u32;
        self.write_inode(id, inode)?;
        self.add_to_dir(parent, name, id)
    }

    /// Appends `data` to an existing file.
    pub fn append_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let id = self.resolve_path(path)?;
        let mut inode = self.read_file_inode(id)?;
        let new_size = inode.size as u64 + data.len() as u64;
        if new_size > self.max_storable_size() {
            return Err(FsError::FileTooLarge);
        }

        let before_owned = self.owned_clusters(&inode)?;
        let first_touched = inode.size / self.superblock.cluster_size;

        if let Err(e) = self.grow_file(&mut inode, data) {
            self.undo_growth(&mut inode, &before_owned, first_touched, data.len());
            return Err(e);
        }
        inode.size = new_size as u32;
        if let Err(e) = self.write_inode(id, &inode) {
            self.undo_growth(&mut inode, &before_owned, first_touched, data.len());
            return Err(e);
        }

        debug!("appended {} bytes to {:?} (now {} bytes)", data.len(), path, inode.size);
        Ok(())
    }

    fn grow_file(&mut self, inode: &mut InodeDisk, data: &[u8]) -> Result<()> {
        let cluster_size = self.superblock.cluster_size as usize;
        let used = inode.size as usize % cluster_size;
        let mut rest = data;

        // Top up the partially filled tail cluster first.
        if used != 0 && !rest.is_empty() {
            let tail_index = inode.size / self.superblock.cluster_size;
            let take = (cluster_size - used).min(rest.len());
            let tail = self.get_file_cluster(inode, tail_index)?;
            if tail != NULL_CLUSTER {
                let mut buf = self.read_cluster(tail)?;
                buf[used..used + take].copy_from_slice(&rest[..take]);
                self.write_cluster(tail, &buf)?;
            } else {
                let mut buf = vec![0u8; used + take];
                buf[used..].copy_from_slice(&rest[..take]);
                self.fill_clusters(inode, tail_index, &buf)?;
            }
            rest = &rest[take..];
        }

        let first_new = inode.cluster_span(self.superblock.cluster_size);
        self.fill_clusters(inode, first_new, rest)
    }

    /// Detaches the clusters an append attached and frees every cluster
    /// that did not belong to the file before it.
    fn undo_growth(&mut self, inode: &mut InodeDisk, before: &OwnedClusters, first: u32, len: usize) {
        let cluster_size = self.superblock.cluster_size as usize;
        let planned = (len + cluster_size - 1) / cluster_size + 1;
        let old: Vec<u32> = before.all().collect();

        // Collect first: once detached, new clusters are unreachable.
        let grown = match self.owned_clusters(inode) {
            Ok(owned) => owned,
            Err(e) => {
                warn!("inode {}: rollback could not walk clusters: {}", inode.id, e);
                return;
            }
        };

        for index in first..first.saturating_add(planned as u32) {
            match self.get_file_cluster(inode, index) {
                Ok(cluster) if cluster != NULL_CLUSTER && !old.contains(&cluster) => {
                    if let Err(e) = self.set_file_cluster(inode, index, NULL_CLUSTER) {
                        warn!("inode {}: rollback could not clear index {}: {}", inode.id, index, e);
                    }
                }
                Ok(_) => {}
                Err(e) => warn!("inode {}: rollback could not read index {}: {}", inode.id, index, e),
            }
        }

        // A second-level block added under an existing indirect2 is still
        // linked from the outer block.
        if before.pointers.contains(&inode.indirect2) {
            let new_blocks: Vec<u32> = grown
                .pointers
                .iter()
                .copied()
                .filter(|c| !before.pointers.contains(c))
                .collect();
            if let Err(e) = self.detach_level2_blocks(inode, &new_blocks) {
                warn!("inode {}: rollback could not detach pointer clusters: {}", inode.id, e);
            }
        }

        for cluster in grown.all().filter(|c| !old.contains(c)) {
            if let Err(e) = self.free_cluster(cluster) {
                warn!("inode {}: rollback could not free cluster {}: {}", inode.id, cluster, e);
            }
        }
        inode.indirect1 = before_pointer(before, inode.indirect1);
        inode.indirect2 = before_pointer(before, inode.indirect2);
    }

    /// Full content of the file behind an inode; unpopulated clusters read
    /// as zeros.
    pub fn read_inode_data(&self, inode: &InodeDisk) -> Result<Vec<u8>> {
        let size = inode.size as usize;
        let cluster_size = self.superblock.cluster_size as usize;
        let mut out = Vec::with_capacity(size);

        for index in 0..inode.cluster_span(self.superblock.cluster_size) {
            let take = (size - out.len()).min(cluster_size);
            let cluster = self.get_file_cluster(inode, index)?;
            if cluster == NULL_CLUSTER {
                out.resize(out.len() + take, 0);
            } else {
                let buf = self.read_cluster(cluster)?;
                out.extend_from_slice(&buf[..take]);
            }
        }
        Ok(out)
    }

    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let id = self.resolve_path(path)?;
        let inode = self.read_file_inode(id)?;
        self.read_inode_data(&inode)
    }

    /// `cp`: into `dst` when it is an existing directory, otherwise to the
    /// name `dst` spells out.
    pub fn copy_file(&mut self, src: &str, dst: &str) -> Result<u32> {
        let data = self.read_file(src)?;
        let (parent, name) = match self.resolve_path(dst) {
            Ok(id) if self.read_inode(id)?.is_directory => (id, self.split_path(src)?.1),
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => self.split_path(dst)?,
            Err(e) => return Err(e),
        };
        let id = self.create_file_in(parent, &name, &data)?;
        debug!("copied {:?} -> {}:{:?} (inode {})", src, parent, name, id);
        Ok(id)
    }

    /// `rm`: unlinks a file and releases its clusters and inode.
    pub fn remove_file(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.split_path(path)?;
        let id = self.find_in_dir(parent, &name)?;
        let mut inode = self.read_file_inode(id)?;

        self.remove_from_dir(parent, &name)?;
        self.release_clusters(&mut inode)?;
        self.write_inode(id, &inode)?;
        self.free_inode(id)?;
        debug!("removed {:?} (inode {})", path, id);
        Ok(())
    }

    pub fn stat(&self, path: &str) -> Result<NodeInfo> {
        let ino = self.resolve_path(path)?;
        let inode = self.read_inode(ino)?;
        let clusters = self.owned_clusters(&inode)?;
        Ok(NodeInfo { ino, inode, clusters })
    }
}

/// Keeps a top-level pointer only if it existed before the failed append.
fn before_pointer(before: &OwnedClusters, pointer: u32) -> u32 {
    if before.pointers.contains(&pointer) {
        pointer
    } else {
        NULL_CLUSTER
    }
}
