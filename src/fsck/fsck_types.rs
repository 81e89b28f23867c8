// src/fsck/fsck_types.rs
//
// Flattened views of the on-disk structures, as the checker needs them.

#[derive(Debug, Clone)]
pub struct Superblock {
    pub signature_ok: bool,
    pub inode_count: u32,
    pub cluster_count: u32,
    pub cluster_size: u32,
    pub root_inode: u32,
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub id: u32,
    /// Bit set in the inode bitmap.
    pub allocated: bool,
    pub is_dir: bool,
    pub size: u64,
    pub parent: u32,
    pub data: Vec<u32>,
    /// indirect1, indirect2 and second-level pointer clusters.
    pub pointers: Vec<u32>,
}

impl Inode {
    pub fn clusters(&self) -> impl Iterator<Item = u32> + '_ {
        self.data.iter().chain(self.pointers.iter()).copied()
    }
}

#[derive(Debug, Clone)]
pub struct Dirent {
    pub inode: u32,
    pub name: String,
}

#[derive(Debug)]
pub struct FsckReport {
    pub clusters_ok: bool,
    pub inodes_ok: bool,
    pub dirs_ok: bool,
    pub errors: Vec<String>,
}

impl FsckReport {
    pub fn new() -> Self {
        Self {
            clusters_ok: true,
            inodes_ok: true,
            dirs_ok: true,
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for FsckReport {
    fn default() -> Self {
        Self::new()
    }
}
