// src/fsck/fsck_backend.rs
//
// What the checker needs to read, and the implementation over a real
// filesystem session.

use super::fsck_types::*;
use crate::disk::ZOSFS_SIGNATURE;
use crate::error::Result;
use crate::fs::ZosFilesystem;

pub trait FsckBackend {
    fn load_superblock(&self) -> Result<Superblock>;
    /// Every inode slot, allocated or not.
    fn load_all_inodes(&self) -> Result<Vec<Inode>>;
    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>>;
    /// One entry per cluster, `true` = used.
    fn load_cluster_bitmap(&self) -> Result<Vec<bool>>;
}

impl FsckBackend for ZosFilesystem {
    fn load_superblock(&self) -> Result<Superblock> {
        let sb = self.superblock();
        let signature_ok = sb.signature.starts_with(ZOSFS_SIGNATURE);
        Ok(Superblock {
            signature_ok,
            inode_count: sb.inode_count,
            cluster_count: sb.cluster_count,
            cluster_size: sb.cluster_size,
            root_inode: self.root_inode(),
        })
    }

    fn load_all_inodes(&self) -> Result<Vec<Inode>> {
        let mut inodes = Vec::with_capacity(self.superblock().inode_count as usize);
        for id in 0..self.superblock().inode_count {
            let allocated = self.is_inode_allocated(id);
            let record = self.read_inode(id)?;
            // Free records keep stale pointers; only walk live ones.
            let owned = if allocated {
                self.reachable_clusters(&record)?
            } else {
                Default::default()
            };
            inodes.push(Inode {
                id,
                allocated,
                is_dir: record.is_directory,
                size: record.size as u64,
                parent: record.parent,
                data: owned.data,
                pointers: owned.pointers,
            });
        }
        Ok(inodes)
    }

    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>> {
        Ok(self
            .dir_slots(ino)?
            .into_iter()
            .map(|slot| Dirent {
                inode: slot.inode,
                name: slot.name_str(),
            })
            .collect())
    }

    fn load_cluster_bitmap(&self) -> Result<Vec<bool>> {
        let bitmap = self.data_bitmap();
        Ok((0..bitmap.capacity()).map(|i| bitmap.is_set(i)).collect())
    }
}
