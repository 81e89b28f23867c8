// src/inode.rs
//
// Fixed-size inode records addressed by id. No caching: every read and
// write goes straight to the backing store.

use log::trace;

use crate::disk::{InodeDisk, INODE_SIZE, ROOT_INODE_ID};
use crate::error::{FsError, Result};
use crate::fs::ZosFilesystem;

impl ZosFilesystem {
    fn check_inode_id(&self, id: u32) -> Result<()> {
        if id >= self.superblock.inode_count {
            return Err(FsError::InvalidId(id));
        }
        Ok(())
    }

    pub fn read_inode(&self, id: u32) -> Result<InodeDisk> {
        self.check_inode_id(id)?;
        let mut buf = [0u8; INODE_SIZE];
        self.store
            .read_bytes(self.superblock.inode_offset(id), &mut buf)?;
        Ok(InodeDisk::from_bytes(&buf))
    }

    pub fn write_inode(&mut self, id: u32, inode: &InodeDisk) -> Result<()> {
        self.check_inode_id(id)?;
        trace!("write inode {}: {:?}", id, inode);
        let offset = self.superblock.inode_offset(id);
        self.store.write_bytes(offset, &inode.to_bytes())
    }

    /// Reserves an inode id. The record itself is left untouched; the
    /// caller populates and writes it.
    pub fn alloc_inode(&mut self) -> Result<u32> {
        self.inode_bitmap.alloc(&mut self.store)
    }

    /// Releases an inode id. The record bytes are not wiped.
    pub fn free_inode(&mut self, id: u32) -> Result<()> {
        self.check_inode_id(id)?;
        if id == ROOT_INODE_ID {
            return Err(FsError::InvalidId(id));
        }
        self.inode_bitmap.free(&mut self.store, id)
    }

    pub fn is_inode_allocated(&self, id: u32) -> bool {
        self.inode_bitmap.is_set(id)
    }
}
