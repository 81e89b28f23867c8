// src/dir.rs
//
// Directories are inodes whose clusters hold arrays of fixed-size
// (inode, name) slots. Slots are reused but never compacted, and a live
// directory never gives clusters back.

use log::{debug, warn};

use crate::disk::{validate_name, DirCluster, DirEntryDisk, InodeDisk, NULL_CLUSTER, ROOT_INODE_ID};
use crate::error::{FsError, NodeKind, Result};
use crate::fs::ZosFilesystem;

/// A live directory entry as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u32,
    pub name: String,
    pub kind: NodeKind,
}

impl ZosFilesystem {
    pub(crate) fn read_directory_inode(&self, dir_id: u32) -> Result<InodeDisk> {
        let inode = self.read_inode(dir_id)?;
        if !inode.is_directory {
            return Err(FsError::TypeMismatch(NodeKind::Directory));
        }
        Ok(inode)
    }

    fn read_dir_cluster(&self, cluster: u32) -> Result<DirCluster> {
        Ok(DirCluster::from_bytes(&self.read_cluster(cluster)?))
    }

    /// Physical clusters of a directory in logical order.
    fn dir_clusters(&self, dir: &InodeDisk) -> Result<Vec<u32>> {
        let span = dir.cluster_span(self.superblock.cluster_size);
        let mut clusters = Vec::with_capacity(span as usize);
        for index in 0..span {
            let cluster = self.get_file_cluster(dir, index)?;
            if cluster != NULL_CLUSTER {
                clusters.push(cluster);
            }
        }
        Ok(clusters)
    }

    // -------------------- directory store --------------------

    /// Inode id of the entry called `name` in directory `dir_id`.
    pub fn find_in_dir(&self, dir_id: u32, name: &str) -> Result<u32> {
        let dir = self.read_directory_inode(dir_id)?;
        for cluster in self.dir_clusters(&dir)? {
            let table = self.read_dir_cluster(cluster)?;
            if let Some(entry) = table.find(name).and_then(|slot| table.get(slot)) {
                return Ok(entry.inode);
            }
        }
        Err(FsError::NotFound)
    }

    /// Inserts `name -> inode_id` into the first free slot, or into a new
    /// cluster appended to the directory when every slot is taken.
    pub fn add_to_dir(&mut self, dir_id: u32, name: &str, inode_id: u32) -> Result<()> {
        let entry = DirEntryDisk::new(name, inode_id)?;
        // Slot inode 0 means "free", so the root can never be named.
        if inode_id == ROOT_INODE_ID || inode_id >= self.superblock.inode_count {
            return Err(FsError::InvalidId(inode_id));
        }

        let mut dir = self.read_directory_inode(dir_id)?;
        let mut free_slot: Option<(u32, DirCluster, usize)> = None;
        for cluster in self.dir_clusters(&dir)? {
            let table = self.read_dir_cluster(cluster)?;
            if table.find(name).is_some() {
                return Err(FsError::AlreadyExists);
            }
            if free_slot.is_none() {
                if let Some(slot) = table.first_free() {
                    free_slot = Some((cluster, table, slot));
                }
            }
        }

        if let Some((cluster, mut table, slot)) = free_slot {
            table.set(slot, entry)?;
            self.write_cluster(cluster, &table.to_bytes())?;
            debug!("dir {}: {:?} -> {} in cluster {} slot {}", dir_id, name, inode_id, cluster, slot);
            return Ok(());
        }

        let logical = dir.cluster_span(self.superblock.cluster_size);
        let cluster = self.alloc_cluster()?;
        let mut table = DirCluster::empty(self.superblock.entries_per_cluster());
        table.set(0, entry)?;

        if let Err(e) = self.attach_dir_cluster(dir_id, &mut dir, logical, cluster, &table) {
            if let Err(undo) = self.free_cluster(cluster) {
                warn!("dir {}: could not free cluster {} after failed grow: {}", dir_id, cluster, undo);
            }
            return Err(e);
        }

        debug!(
            "dir {}: grew to {} bytes, {:?} -> {} in new cluster {}",
            dir_id, dir.size, name, inode_id, cluster
        );
        Ok(())
    }

    fn attach_dir_cluster(
        &mut self,
        dir_id: u32,
        dir: &mut InodeDisk,
        logical: u32,
        cluster: u32,
        table: &DirCluster,
    ) -> Result<()> {
        self.write_cluster(cluster, &table.to_bytes())?;
        self.set_file_cluster(dir, logical, cluster)?;
        dir.size += self.superblock.cluster_size;
        self.write_inode(dir_id, dir)
    }

    /// Clears the slot holding `name` and returns the inode it pointed at.
    /// The directory keeps its size and clusters.
    pub fn remove_from_dir(&mut self, dir_id: u32, name: &str) -> Result<u32> {
        let dir = self.read_directory_inode(dir_id)?;
        for cluster in self.dir_clusters(&dir)? {
            let mut table = self.read_dir_cluster(cluster)?;
            let Some(slot) = table.find(name) else {
                continue;
            };
            let inode = table.get(slot).map(|e| e.inode).unwrap_or(ROOT_INODE_ID);
            table.clear(slot)?;
            self.write_cluster(cluster, &table.to_bytes())?;
            debug!("dir {}: removed {:?} (inode {})", dir_id, name, inode);
            return Ok(inode);
        }
        Err(FsError::NotFound)
    }

    /// Live slots exactly as stored, without looking at the children.
    pub fn dir_slots(&self, dir_id: u32) -> Result<Vec<DirEntryDisk>> {
        let dir = self.read_directory_inode(dir_id)?;
        let mut slots = Vec::new();
        for cluster in self.dir_clusters(&dir)? {
            slots.extend(self.read_dir_cluster(cluster)?.live().copied());
        }
        Ok(slots)
    }

    pub fn list_dir(&self, dir_id: u32) -> Result<Vec<DirEntry>> {
        self.dir_slots(dir_id)?
            .into_iter()
            .map(|slot| {
                let child = self.read_inode(slot.inode)?;
                Ok(DirEntry {
                    ino: slot.inode,
                    name: slot.name_str(),
                    kind: if child.is_directory {
                        NodeKind::Directory
                    } else {
                        NodeKind::File
                    },
                })
            })
            .collect()
    }

    pub fn is_dir_empty(&self, dir_id: u32) -> Result<bool> {
        Ok(self.dir_slots(dir_id)?.is_empty())
    }

    /// True when `ancestor` is `node` or lies on its parent chain.
    pub(crate) fn is_ancestor_of(&self, ancestor: u32, mut node: u32) -> Result<bool> {
        for _ in 0..=self.superblock.inode_count {
            if node == ancestor {
                return Ok(true);
            }
            if node == ROOT_INODE_ID {
                return Ok(false);
            }
            node = self.read_inode(node)?.parent;
        }
        Ok(false)
    }

    // -------------------- directory operations --------------------

    /// Creates an empty directory `name` inside `parent`.
    pub fn create_directory(&mut self, parent: u32, name: &str) -> Result<u32> {
        validate_name(name)?;
        match self.find_in_dir(parent, name) {
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let id = self.alloc_inode()?;
        let created = self
            .write_inode(id, &InodeDisk::directory(id, parent))
            .and_then(|()| self.add_to_dir(parent, name, id));
        if let Err(e) = created {
            if let Err(undo) = self.free_inode(id) {
                warn!("mkdir {:?}: could not free inode {}: {}", name, id, undo);
            }
            return Err(e);
        }
        debug!("mkdir {:?} in {} -> inode {}", name, parent, id);
        Ok(id)
    }

    pub fn make_dir(&mut self, path: &str) -> Result<u32> {
        let (parent, name) = self.split_path(path)?;
        self.create_directory(parent, &name)
    }

    /// Deletes the empty directory `name` from `parent`, releasing its
    /// clusters and inode.
    pub fn remove_directory(&mut self, parent: u32, name: &str) -> Result<()> {
        let id = self.find_in_dir(parent, name)?;
        let mut inode = self.read_inode(id)?;
        if !inode.is_directory {
            return Err(FsError::TypeMismatch(NodeKind::Directory));
        }
        if self.is_ancestor_of(id, self.current_inode)? {
            return Err(FsError::Busy);
        }
        if !self.is_dir_empty(id)? {
            return Err(FsError::NotEmpty);
        }

        self.remove_from_dir(parent, name)?;
        self.release_clusters(&mut inode)?;
        self.write_inode(id, &inode)?;
        self.free_inode(id)?;
        debug!("rmdir {:?} (inode {}) from {}", name, id, parent);
        Ok(())
    }

    pub fn remove_dir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.split_path(path)?;
        self.remove_directory(parent, &name)
    }

    /// Moves `parent/name` to `new_parent/new_name`.
    pub fn rename_entry(&mut self, parent: u32, name: &str, new_parent: u32, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let id = self.find_in_dir(parent, name)?;
        self.read_directory_inode(new_parent)?;
        if parent == new_parent && name == new_name {
            return Ok(());
        }

        let mut inode = self.read_inode(id)?;
        if inode.is_directory && self.is_ancestor_of(id, new_parent)? {
            return Err(FsError::InvalidArgument(format!(
                "cannot move {:?} inside itself",
                name
            )));
        }

        self.add_to_dir(new_parent, new_name, id)?;
        self.remove_from_dir(parent, name)?;
        if inode.parent != new_parent {
            inode.parent = new_parent;
            self.write_inode(id, &inode)?;
        }
        if self.is_ancestor_of(id, self.current_inode)? {
            self.current_path = self.describe_path(self.current_inode)?;
        }
        debug!("mv {}:{:?} -> {}:{:?} (inode {})", parent, name, new_parent, new_name, id);
        Ok(())
    }

    /// `mv`: into `dst` when it is an existing directory, otherwise to the
    /// name `dst` spells out.
    pub fn move_entry(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_parent, src_name) = self.split_path(src)?;
        let (dst_parent, dst_name) = match self.resolve_path(dst) {
            Ok(target) if self.read_inode(target)?.is_directory => (target, src_name.clone()),
            Ok(_) => return Err(FsError::AlreadyExists),
            Err(FsError::NotFound) => self.split_path(dst)?,
            Err(e) => return Err(e),
        };
        self.rename_entry(src_parent, &src_name, dst_parent, &dst_name)
    }

    pub fn list_path(&self, path: &str) -> Result<Vec<DirEntry>> {
        let id = self.resolve_path(path)?;
        self.list_dir(id)
    }
}
