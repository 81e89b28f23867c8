mod bitmap;
mod cluster;
mod config;
mod dir;
mod disk;
mod error;
mod file;
mod fs;
mod inode;
mod path;
mod store;

pub mod fsck;
pub mod logger;

pub use crate::fs::{FsStats, ZosFilesystem};
pub use crate::error::{FsError, NodeKind, Result};
pub use crate::config::{parse_size, FormatOptions, FsConfig, DEFAULT_DISK_SIZE};
pub use crate::disk::{
    validate_name,
    DirCluster,
    DirEntryDisk,
    InodeDisk,
    PointerBlock,
    SuperblockDisk,
    DIRECT_LINKS,
    DIR_ENTRY_SIZE,
    INODE_SIZE,
    NULL_CLUSTER,
    ROOT_INODE_ID,
    SUPERBLOCK_SIZE,
    ZOSFS_CLUSTER_SIZE,
    ZOSFS_DESCRIPTION,
    ZOSFS_NAME_LEN,
    ZOSFS_SIGNATURE,
};
pub use crate::bitmap::Bitmap;
pub use crate::store::BlockStore;
pub use crate::cluster::{ClusterSlot, OwnedClusters};
pub use crate::dir::DirEntry;
pub use crate::file::NodeInfo;
pub use crate::path::join_display_path;
