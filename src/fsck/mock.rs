// src/fsck/mock.rs
//
// In-memory backend for exercising the checker without an image.

use super::{fsck_backend::FsckBackend, fsck_types::*};
use crate::error::Result;

pub struct MockBackend {
    pub superblock: Superblock,
    pub inodes: Vec<Inode>,
    /// Entries per inode id; non-directories get an empty list.
    pub dirs: Vec<Vec<Dirent>>,
    pub bitmap: Vec<bool>,
}

impl FsckBackend for MockBackend {
    fn load_superblock(&self) -> Result<Superblock> {
        Ok(self.superblock.clone())
    }

    fn load_all_inodes(&self) -> Result<Vec<Inode>> {
        Ok(self.inodes.clone())
    }

    fn read_dir(&self, ino: u32) -> Result<Vec<Dirent>> {
        Ok(self.dirs.get(ino as usize).cloned().unwrap_or_default())
    }

    fn load_cluster_bitmap(&self) -> Result<Vec<bool>> {
        Ok(self.bitmap.clone())
    }
}
