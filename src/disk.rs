// src/disk.rs
//
// On-disk records. Every integer is stored little-endian as u32; the
// encoders below are the only place that knows the byte offsets.

use crate::error::{FsError, Result};

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

pub const ZOSFS_CLUSTER_SIZE: u32 = 4096;
pub const ZOSFS_MIN_CLUSTER_SIZE: u32 = 64;
pub const ZOSFS_MAX_CLUSTER_SIZE: u32 = 65536;
pub const ZOSFS_SIGNATURE: &[u8] = b"ZOSFS25";
pub const ZOSFS_DESCRIPTION: &str = "ZOS Inodesystem";
pub const ZOSFS_NAME_LEN: usize = 12;

pub const DIRECT_LINKS: usize = 5;
pub const ID_ITEM_FREE: u32 = 0;
pub const NULL_CLUSTER: u32 = 0;
pub const ROOT_INODE_ID: u32 = 0;

/// One inode per this many clusters.
pub const CLUSTERS_PER_INODE: u32 = 8;

pub const SIGNATURE_LEN: usize = 9;
pub const DESCRIPTION_LEN: usize = 251;
pub const SUPERBLOCK_SIZE: usize = SIGNATURE_LEN + DESCRIPTION_LEN + 8 * 4;
pub const INODE_SIZE: usize = 44;
pub const DIR_ENTRY_SIZE: usize = 4 + ZOSFS_NAME_LEN;
pub const POINTER_SIZE: usize = 4;

fn get_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Bytes of a NUL padded field up to the first NUL.
fn trim_nul(field: &[u8]) -> &[u8] {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    &field[..end]
}

// -------------------- Superblock --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuperblockDisk {
    pub signature: [u8; SIGNATURE_LEN],
    pub description: [u8; DESCRIPTION_LEN],

    pub disk_size: u32,
    pub cluster_size: u32,
    pub cluster_count: u32,
    pub inode_count: u32,

    pub inode_bitmap_start: u32,
    pub data_bitmap_start: u32,
    pub inode_start: u32,
    pub data_start: u32,
}

impl SuperblockDisk {
    /// Computes the region layout for a fresh filesystem.
    pub fn layout(disk_size: u64, cluster_size: u32, description: &str) -> Result<Self> {
        if cluster_size < ZOSFS_MIN_CLUSTER_SIZE
            || cluster_size > ZOSFS_MAX_CLUSTER_SIZE
            || cluster_size as usize % DIR_ENTRY_SIZE != 0
        {
            return Err(FsError::InvalidLayout(format!(
                "cluster size {} must be a multiple of {} between {} and {}",
                cluster_size, DIR_ENTRY_SIZE, ZOSFS_MIN_CLUSTER_SIZE, ZOSFS_MAX_CLUSTER_SIZE
            )));
        }
        let disk_size = u32::try_from(disk_size).map_err(|_| {
            FsError::InvalidLayout(format!("disk size {} does not fit in 32 bits", disk_size))
        })?;

        let cluster_count = disk_size / cluster_size;
        let inode_count = cluster_count / CLUSTERS_PER_INODE;
        if inode_count == 0 {
            return Err(FsError::InvalidLayout(format!(
                "disk size {} yields {} clusters, need at least {}",
                disk_size, cluster_count, CLUSTERS_PER_INODE
            )));
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature[..ZOSFS_SIGNATURE.len()].copy_from_slice(ZOSFS_SIGNATURE);
        let mut desc = [0u8; DESCRIPTION_LEN];
        let len = description.len().min(DESCRIPTION_LEN - 1);
        desc[..len].copy_from_slice(&description.as_bytes()[..len]);

        let mut sb = SuperblockDisk {
            signature,
            description: desc,
            disk_size,
            cluster_size,
            cluster_count,
            inode_count,
            inode_bitmap_start: 0,
            data_bitmap_start: 0,
            inode_start: 0,
            data_start: 0,
        };

        let mut offset = SUPERBLOCK_SIZE as u64;
        sb.inode_bitmap_start = offset as u32;
        offset += sb.inode_bitmap_bytes() as u64;
        sb.data_bitmap_start = offset as u32;
        offset += sb.data_bitmap_bytes() as u64;
        sb.inode_start = offset as u32;
        offset += inode_count as u64 * INODE_SIZE as u64;
        sb.data_start = u32::try_from(offset)
            .map_err(|_| FsError::InvalidLayout("metadata regions overflow 32 bits".into()))?;

        Ok(sb)
    }

    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        buf[..SIGNATURE_LEN].copy_from_slice(&self.signature);
        buf[SIGNATURE_LEN..SIGNATURE_LEN + DESCRIPTION_LEN].copy_from_slice(&self.description);
        let fields = [
            self.disk_size,
            self.cluster_size,
            self.cluster_count,
            self.inode_count,
            self.inode_bitmap_start,
            self.data_bitmap_start,
            self.inode_start,
            self.data_start,
        ];
        let base = SIGNATURE_LEN + DESCRIPTION_LEN;
        for (i, value) in fields.iter().enumerate() {
            put_u32(&mut buf, base + i * 4, *value);
        }
        buf
    }

    /// Decodes and validates a superblock. A wrong signature means the
    /// backing file was never formatted (or belongs to something else).
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_SIZE {
            return Err(FsError::NotFormatted);
        }
        if trim_nul(&buf[..SIGNATURE_LEN]) != ZOSFS_SIGNATURE {
            return Err(FsError::NotFormatted);
        }

        let mut signature = [0u8; SIGNATURE_LEN];
        signature.copy_from_slice(&buf[..SIGNATURE_LEN]);
        let mut description = [0u8; DESCRIPTION_LEN];
        description.copy_from_slice(&buf[SIGNATURE_LEN..SIGNATURE_LEN + DESCRIPTION_LEN]);

        let base = SIGNATURE_LEN + DESCRIPTION_LEN;
        let sb = SuperblockDisk {
            signature,
            description,
            disk_size: get_u32(buf, base),
            cluster_size: get_u32(buf, base + 4),
            cluster_count: get_u32(buf, base + 8),
            inode_count: get_u32(buf, base + 12),
            inode_bitmap_start: get_u32(buf, base + 16),
            data_bitmap_start: get_u32(buf, base + 20),
            inode_start: get_u32(buf, base + 24),
            data_start: get_u32(buf, base + 28),
        };
        sb.validate()?;
        Ok(sb)
    }

    /// Regions must be contiguous, disjoint and in the fixed order.
    pub fn validate(&self) -> Result<()> {
        if self.cluster_size < ZOSFS_MIN_CLUSTER_SIZE
            || self.cluster_size > ZOSFS_MAX_CLUSTER_SIZE
            || self.cluster_size as usize % DIR_ENTRY_SIZE != 0
        {
            return Err(FsError::InvalidLayout(format!("bad cluster size {}", self.cluster_size)));
        }
        if self.cluster_count < 2 || self.inode_count == 0 {
            return Err(FsError::InvalidLayout(format!(
                "{} clusters / {} inodes",
                self.cluster_count, self.inode_count
            )));
        }

        let ibitmap = SUPERBLOCK_SIZE as u64;
        let dbitmap = ibitmap + self.inode_bitmap_bytes() as u64;
        let itable = dbitmap + self.data_bitmap_bytes() as u64;
        let data = itable + self.inode_count as u64 * INODE_SIZE as u64;
        let expected = [ibitmap, dbitmap, itable, data];
        let found = [
            self.inode_bitmap_start,
            self.data_bitmap_start,
            self.inode_start,
            self.data_start,
        ];
        if expected.iter().zip(found.iter()).any(|(e, f)| *e != *f as u64) {
            return Err(FsError::InvalidLayout(format!(
                "region offsets {:?} do not match expected {:?}",
                found, expected
            )));
        }
        Ok(())
    }

    pub fn description_str(&self) -> String {
        String::from_utf8_lossy(trim_nul(&self.description)).into_owned()
    }

    pub fn inode_bitmap_bytes(&self) -> usize {
        (self.inode_count as usize + 7) / 8
    }

    pub fn data_bitmap_bytes(&self) -> usize {
        (self.cluster_count as usize + 7) / 8
    }

    /// Pointers per cluster (`P`).
    pub fn pointers_per_cluster(&self) -> u32 {
        self.cluster_size / POINTER_SIZE as u32
    }

    pub fn entries_per_cluster(&self) -> usize {
        self.cluster_size as usize / DIR_ENTRY_SIZE
    }

    /// Number of logical clusters a single inode can address.
    pub fn max_file_clusters(&self) -> u64 {
        let p = self.pointers_per_cluster() as u64;
        DIRECT_LINKS as u64 + p + p * p
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_clusters() * self.cluster_size as u64
    }

    /// Length the backing file must have to hold every region.
    pub fn image_len(&self) -> u64 {
        self.data_start as u64 + self.cluster_count as u64 * self.cluster_size as u64
    }

    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        self.data_start as u64 + cluster as u64 * self.cluster_size as u64
    }

    pub fn inode_offset(&self, id: u32) -> u64 {
        self.inode_start as u64 + id as u64 * INODE_SIZE as u64
    }
}

// -------------------- Inode --------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InodeDisk {
    pub id: u32,
    pub is_directory: bool,
    pub references: u8,
    pub size: u32,
    pub direct: [u32; DIRECT_LINKS],
    pub indirect1: u32,
    pub indirect2: u32,
    /// Only used to resolve "..".
    pub parent: u32,
}

impl InodeDisk {
    pub fn directory(id: u32, parent: u32) -> Self {
        Self {
            id,
            is_directory: true,
            references: 1,
            parent,
            ..Self::default()
        }
    }

    pub fn file(id: u32, parent: u32) -> Self {
        Self {
            id,
            is_directory: false,
            references: 1,
            parent,
            ..Self::default()
        }
    }

    /// Number of logical clusters covered by `size`.
    pub fn cluster_span(&self, cluster_size: u32) -> u32 {
        ((self.size as u64 + cluster_size as u64 - 1) / cluster_size as u64) as u32
    }

    pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
        let mut buf = [0u8; INODE_SIZE];
        put_u32(&mut buf, 0, self.id);
        buf[4] = self.is_directory as u8;
        buf[5] = self.references;
        put_u32(&mut buf, 8, self.size);
        for (i, ptr) in self.direct.iter().enumerate() {
            put_u32(&mut buf, 12 + i * 4, *ptr);
        }
        put_u32(&mut buf, 32, self.indirect1);
        put_u32(&mut buf, 36, self.indirect2);
        put_u32(&mut buf, 40, self.parent);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut direct = [NULL_CLUSTER; DIRECT_LINKS];
        for (i, ptr) in direct.iter_mut().enumerate() {
            *ptr = get_u32(buf, 12 + i * 4);
        }
        Self {
            id: get_u32(buf, 0),
            is_directory: buf[4] != 0,
            references: buf[5],
            size: get_u32(buf, 8),
            direct,
            indirect1: get_u32(buf, 32),
            indirect2: get_u32(buf, 36),
            parent: get_u32(buf, 40),
        }
    }
}

// -------------------- Directory entry --------------------

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DirEntryDisk {
    pub inode: u32,
    pub name: [u8; ZOSFS_NAME_LEN],
}

impl std::fmt::Debug for DirEntryDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirEntryDisk")
            .field("inode", &self.inode)
            .field("name", &self.name_str())
            .finish()
    }
}

impl DirEntryDisk {
    pub const FREE: DirEntryDisk = DirEntryDisk {
        inode: ID_ITEM_FREE,
        name: [0u8; ZOSFS_NAME_LEN],
    };

    pub fn new(name: &str, inode: u32) -> Result<Self> {
        validate_name(name)?;
        let mut field = [0u8; ZOSFS_NAME_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        Ok(Self { inode, name: field })
    }

    pub fn is_free(&self) -> bool {
        self.inode == ID_ITEM_FREE
    }

    pub fn name_bytes(&self) -> &[u8] {
        trim_nul(&self.name)
    }

    pub fn name_str(&self) -> String {
        String::from_utf8_lossy(self.name_bytes()).into_owned()
    }

    /// Byte comparison up to the width of the name field.
    pub fn matches(&self, name: &str) -> bool {
        name.len() < ZOSFS_NAME_LEN && self.name_bytes() == name.as_bytes()
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE] {
        let mut buf = [0u8; DIR_ENTRY_SIZE];
        put_u32(&mut buf, 0, self.inode);
        buf[4..].copy_from_slice(&self.name);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let mut name = [0u8; ZOSFS_NAME_LEN];
        name.copy_from_slice(&buf[4..DIR_ENTRY_SIZE]);
        Self {
            inode: get_u32(buf, 0),
            name,
        }
    }
}

/// Names are 1..=11 bytes, no '/', no NUL, and never "." or "..".
pub fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name.len() >= ZOSFS_NAME_LEN
        || name == "."
        || name == ".."
        || name.bytes().any(|b| b == b'/' || b == 0);
    if bad {
        return Err(FsError::InvalidName(name.to_string()));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Cluster views
// -----------------------------------------------------------------------------

/// A cluster reinterpreted as `P` cluster pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointerBlock {
    ptrs: Vec<u32>,
}

impl PointerBlock {
    pub fn zeroed(count: usize) -> Self {
        Self {
            ptrs: vec![NULL_CLUSTER; count],
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            ptrs: buf.chunks_exact(POINTER_SIZE).map(|c| get_u32(c, 0)).collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.ptrs.len() * POINTER_SIZE];
        for (i, ptr) in self.ptrs.iter().enumerate() {
            put_u32(&mut buf, i * POINTER_SIZE, *ptr);
        }
        buf
    }

    /// `None` when `index` is past the end of the block.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.ptrs.get(index).copied()
    }

    pub fn set(&mut self, index: usize, cluster: u32) -> Result<()> {
        let slot = self
            .ptrs
            .get_mut(index)
            .ok_or(FsError::InvalidId(index as u32))?;
        *slot = cluster;
        Ok(())
    }

    /// Non-null pointers in slot order.
    pub fn live(&self) -> impl Iterator<Item = u32> + '_ {
        self.ptrs.iter().copied().filter(|&p| p != NULL_CLUSTER)
    }
}

/// A directory cluster reinterpreted as dentry slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirCluster {
    slots: Vec<DirEntryDisk>,
}

impl DirCluster {
    pub fn empty(entries: usize) -> Self {
        Self {
            slots: vec![DirEntryDisk::FREE; entries],
        }
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            slots: buf.chunks_exact(DIR_ENTRY_SIZE).map(DirEntryDisk::from_bytes).collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.slots.len() * DIR_ENTRY_SIZE);
        for slot in &self.slots {
            buf.extend_from_slice(&slot.to_bytes());
        }
        buf
    }

    /// Slot of the live entry called `name`.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|e| !e.is_free() && e.matches(name))
    }

    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(DirEntryDisk::is_free)
    }

    pub fn get(&self, slot: usize) -> Option<&DirEntryDisk> {
        self.slots.get(slot)
    }

    pub fn set(&mut self, slot: usize, entry: DirEntryDisk) -> Result<()> {
        let target = self
            .slots
            .get_mut(slot)
            .ok_or(FsError::InvalidId(slot as u32))?;
        *target = entry;
        Ok(())
    }

    pub fn clear(&mut self, slot: usize) -> Result<()> {
        self.set(slot, DirEntryDisk::FREE)
    }

    pub fn live(&self) -> impl Iterator<Item = &DirEntryDisk> + '_ {
        self.slots.iter().filter(|e| !e.is_free())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_megabyte_layout() {
        let sb = SuperblockDisk::layout(1024 * 1024, ZOSFS_CLUSTER_SIZE, ZOSFS_DESCRIPTION).unwrap();
        assert_eq!(sb.cluster_count, 256);
        assert_eq!(sb.inode_count, 32);
        assert_eq!(sb.inode_bitmap_start as usize, SUPERBLOCK_SIZE);
        assert_eq!(sb.data_bitmap_start, sb.inode_bitmap_start + 4);
        assert_eq!(sb.inode_start, sb.data_bitmap_start + 32);
        assert_eq!(sb.data_start, sb.inode_start + 32 * INODE_SIZE as u32);
        assert_eq!(sb.pointers_per_cluster(), 1024);
        assert_eq!(sb.entries_per_cluster(), 256);
    }

    #[test]
    fn layout_rejects_tiny_disks_and_odd_clusters() {
        assert!(matches!(
            SuperblockDisk::layout(4096 * 7, 4096, "x"),
            Err(FsError::InvalidLayout(_))
        ));
        assert!(matches!(
            SuperblockDisk::layout(1 << 20, 100, "x"),
            Err(FsError::InvalidLayout(_))
        ));
        assert!(matches!(
            SuperblockDisk::layout(1 << 33, 4096, "x"),
            Err(FsError::InvalidLayout(_))
        ));
    }

    #[test]
    fn superblock_survives_encoding() {
        let sb = SuperblockDisk::layout(2 * 1024 * 1024, 1024, "test image").unwrap();
        let decoded = SuperblockDisk::from_bytes(&sb.to_bytes()).unwrap();
        assert_eq!(decoded, sb);
        assert_eq!(decoded.description_str(), "test image");
    }

    #[test]
    fn foreign_bytes_are_not_formatted() {
        let zeros = [0u8; SUPERBLOCK_SIZE];
        assert!(matches!(SuperblockDisk::from_bytes(&zeros), Err(FsError::NotFormatted)));
        assert!(matches!(SuperblockDisk::from_bytes(&[1, 2, 3]), Err(FsError::NotFormatted)));
    }

    #[test]
    fn shifted_regions_are_rejected() {
        let mut sb = SuperblockDisk::layout(1024 * 1024, 4096, "").unwrap();
        sb.inode_start += 1;
        assert!(matches!(
            SuperblockDisk::from_bytes(&sb.to_bytes()),
            Err(FsError::InvalidLayout(_))
        ));
    }

    #[test]
    fn inode_record_is_byte_stable() {
        let inode = InodeDisk {
            id: 7,
            is_directory: true,
            references: 1,
            size: 8192,
            direct: [3, 4, 0, 0, 0],
            indirect1: 9,
            indirect2: 0,
            parent: 2,
        };
        let bytes = inode.to_bytes();
        assert_eq!(InodeDisk::from_bytes(&bytes), inode);
        assert_eq!(InodeDisk::from_bytes(&bytes).to_bytes(), bytes);
    }

    #[test]
    fn cluster_span_rounds_up() {
        let mut inode = InodeDisk::file(1, 0);
        assert_eq!(inode.cluster_span(4096), 0);
        inode.size = 1;
        assert_eq!(inode.cluster_span(4096), 1);
        inode.size = 8193;
        assert_eq!(inode.cluster_span(4096), 3);
    }

    #[test]
    fn names_are_limited_to_eleven_bytes() {
        assert!(DirEntryDisk::new("abcdefghijk", 1).is_ok());
        assert!(matches!(
            DirEntryDisk::new("abcdefghijkl", 1),
            Err(FsError::InvalidName(_))
        ));
        for bad in ["", ".", "..", "a/b"] {
            assert!(DirEntryDisk::new(bad, 1).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn entry_matching_is_exact() {
        let entry = DirEntryDisk::new("docs", 5).unwrap();
        assert!(entry.matches("docs"));
        assert!(!entry.matches("doc"));
        assert!(!entry.matches("docs2"));
        assert_eq!(DirEntryDisk::from_bytes(&entry.to_bytes()), entry);
    }

    #[test]
    fn pointer_block_bounds() {
        let mut block = PointerBlock::zeroed(16);
        block.set(15, 42).unwrap();
        assert_eq!(block.get(15), Some(42));
        assert_eq!(block.get(16), None);
        assert!(matches!(block.set(16, 1), Err(FsError::InvalidId(16))));
        let decoded = PointerBlock::from_bytes(&block.to_bytes());
        assert_eq!(decoded.live().collect::<Vec<_>>(), vec![42]);
    }

    #[test]
    fn dir_cluster_slots() {
        let mut table = DirCluster::empty(4);
        assert_eq!(table.first_free(), Some(0));
        table.set(0, DirEntryDisk::new("a", 3).unwrap()).unwrap();
        table.set(1, DirEntryDisk::new("b", 4).unwrap()).unwrap();
        assert_eq!(table.find("b"), Some(1));
        table.clear(0).unwrap();
        assert_eq!(table.first_free(), Some(0));
        assert_eq!(table.find("a"), None);
        let decoded = DirCluster::from_bytes(&table.to_bytes());
        assert_eq!(decoded.live().count(), 1);
    }
}
