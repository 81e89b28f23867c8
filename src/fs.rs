// src/fs.rs
use std::path::Path;

use log::{debug, info};

use crate::bitmap::Bitmap;
use crate::config::{FormatOptions, FsConfig};
use crate::disk::{InodeDisk, SuperblockDisk, ROOT_INODE_ID, SUPERBLOCK_SIZE};
use crate::error::{FsError, Result};
use crate::store::BlockStore;

// -----------------------------------------------------------------------------
// Filesystem session
// -----------------------------------------------------------------------------

/// An open filesystem image. Owns the backing store and the in-memory
/// mirrors of both bitmaps; one session per backing file.
#[derive(Debug)]
pub struct ZosFilesystem {
    pub(crate) store: BlockStore,
    pub(crate) superblock: SuperblockDisk,
    pub(crate) inode_bitmap: Bitmap,
    pub(crate) data_bitmap: Bitmap,
    pub(crate) current_inode: u32,
    pub(crate) current_path: String,
}

/// Usage figures reported by [`ZosFilesystem::statfs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsStats {
    pub disk_size: u64,
    pub cluster_size: u32,
    /// Allocatable clusters (cluster 0 excluded).
    pub total_clusters: u32,
    pub used_clusters: u32,
    pub free_clusters: u32,
    pub inode_count: u32,
    pub used_inodes: u32,
    pub free_inodes: u32,
    pub directories: u32,
}

impl ZosFilesystem {
    /// Creates (or overwrites) a backing file and lays out an empty
    /// filesystem whose root directory is the first inode allocated.
    pub fn format(path: &Path, options: &FormatOptions) -> Result<Self> {
        let superblock =
            SuperblockDisk::layout(options.disk_size, options.cluster_size, &options.description)?;

        let mut store = BlockStore::create(path, options.durable_writes)?;
        store.set_len(superblock.image_len())?;
        store.write_bytes(0, &superblock.to_bytes())?;

        let inode_bitmap = Bitmap::new(
            superblock.inode_count,
            0,
            superblock.inode_bitmap_start as u64,
        );
        let data_bitmap = Bitmap::new(
            superblock.cluster_count,
            1,
            superblock.data_bitmap_start as u64,
        );
        inode_bitmap.persist(&mut store)?;
        data_bitmap.persist(&mut store)?;

        let mut fs = Self {
            store,
            superblock,
            inode_bitmap,
            data_bitmap,
            current_inode: ROOT_INODE_ID,
            current_path: "/".to_string(),
        };

        let root_id = fs.alloc_inode()?;
        fs.write_inode(root_id, &InodeDisk::directory(root_id, root_id))?;
        fs.current_inode = root_id;

        info!(
            "formatted {:?}: {} clusters of {} bytes, {} inodes, data at {:#x}",
            path,
            superblock.cluster_count,
            superblock.cluster_size,
            superblock.inode_count,
            superblock.data_start
        );
        Ok(fs)
    }

    /// Opens a formatted backing file.
    pub fn open(path: &Path, config: &FsConfig) -> Result<Self> {
        let store = BlockStore::open(path, config.durable_writes)?;
        if store.len()? < SUPERBLOCK_SIZE as u64 {
            return Err(FsError::NotFormatted);
        }

        let mut raw = [0u8; SUPERBLOCK_SIZE];
        store.read_bytes(0, &mut raw)?;
        let superblock = SuperblockDisk::from_bytes(&raw)?;

        let len = store.len()?;
        if len < superblock.image_len() {
            return Err(FsError::InvalidLayout(format!(
                "backing file holds {} bytes, layout needs {}",
                len,
                superblock.image_len()
            )));
        }

        let inode_bitmap = Bitmap::load(
            &store,
            superblock.inode_count,
            0,
            superblock.inode_bitmap_start as u64,
        )?;
        let data_bitmap = Bitmap::load(
            &store,
            superblock.cluster_count,
            1,
            superblock.data_bitmap_start as u64,
        )?;

        if !inode_bitmap.is_set(ROOT_INODE_ID) {
            return Err(FsError::InvalidLayout("root inode is not allocated".into()));
        }

        info!(
            "opened {:?}: {} clusters, {} inodes",
            path, superblock.cluster_count, superblock.inode_count
        );

        Ok(Self {
            store,
            superblock,
            inode_bitmap,
            data_bitmap,
            current_inode: ROOT_INODE_ID,
            current_path: "/".to_string(),
        })
    }

    pub fn superblock(&self) -> &SuperblockDisk {
        &self.superblock
    }

    pub fn root_inode(&self) -> u32 {
        ROOT_INODE_ID
    }

    pub fn inode_bitmap(&self) -> &Bitmap {
        &self.inode_bitmap
    }

    pub fn data_bitmap(&self) -> &Bitmap {
        &self.data_bitmap
    }

    /// Usage statistics computed from the bitmaps and the inode table.
    pub fn statfs(&self) -> Result<FsStats> {
        let sb = &self.superblock;
        let used_inodes = self.inode_bitmap.count_set();
        let used_clusters = self.data_bitmap.count_set();

        let mut directories = 0;
        for id in 0..sb.inode_count {
            if self.inode_bitmap.is_set(id) && self.read_inode(id)?.is_directory {
                directories += 1;
            }
        }

        let stats = FsStats {
            disk_size: sb.disk_size as u64,
            cluster_size: sb.cluster_size,
            total_clusters: sb.cluster_count - 1,
            used_clusters,
            free_clusters: sb.cluster_count - 1 - used_clusters,
            inode_count: sb.inode_count,
            used_inodes,
            free_inodes: sb.inode_count - used_inodes,
            directories,
        };
        debug!("statfs: {:?}", stats);
        Ok(stats)
    }
}
