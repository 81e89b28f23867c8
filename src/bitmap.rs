// src/bitmap.rs
//
// First-fit bit allocator with write-through persistence. The in-memory
// bytes and the on-disk region are identical whenever a call returns Ok,
// and are restored to their previous state when the write fails.

use log::{trace, warn};

use crate::error::{FsError, Result};
use crate::store::BlockStore;

#[derive(Debug, Clone)]
pub struct Bitmap {
    bytes: Vec<u8>,
    /// Number of tracked items.
    capacity: u32,
    /// Lowest allocatable index. Bits below it are never handed out.
    first: u32,
    /// Offset of the region in the backing file.
    region_start: u64,
}

impl Bitmap {
    pub fn new(capacity: u32, first: u32, region_start: u64) -> Self {
        Self {
            bytes: vec![0u8; (capacity as usize + 7) / 8],
            capacity,
            first,
            region_start,
        }
    }

    pub fn load(store: &BlockStore, capacity: u32, first: u32, region_start: u64) -> Result<Self> {
        let mut bitmap = Self::new(capacity, first, region_start);
        store.read_bytes(region_start, &mut bitmap.bytes)?;
        Ok(bitmap)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_set(&self, index: u32) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.bytes[index as usize / 8] & (1 << (index % 8)) != 0
    }

    fn put(&mut self, index: u32, value: bool) {
        let mask = 1u8 << (index % 8);
        let byte = &mut self.bytes[index as usize / 8];
        if value {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }

    /// Lowest clear bit in the allocatable range.
    pub fn first_free(&self) -> Option<u32> {
        (self.first..self.capacity).find(|&i| !self.is_set(i))
    }

    /// Set bits in the allocatable range.
    pub fn count_set(&self) -> u32 {
        (self.first..self.capacity).filter(|&i| self.is_set(i)).count() as u32
    }

    pub fn persist(&self, store: &mut BlockStore) -> Result<()> {
        store.write_bytes(self.region_start, &self.bytes)
    }

    /// Claims the lowest free index and writes the whole region back.
    pub fn alloc(&mut self, store: &mut BlockStore) -> Result<u32> {
        let index = self.first_free().ok_or(FsError::NoSpace)?;
        self.put(index, true);
        if let Err(e) = self.persist(store) {
            self.put(index, false);
            return Err(e);
        }
        trace!("bitmap@{:#x}: set bit {}", self.region_start, index);
        Ok(index)
    }

    pub fn free(&mut self, store: &mut BlockStore, index: u32) -> Result<()> {
        if index < self.first || index >= self.capacity {
            return Err(FsError::InvalidId(index));
        }
        if !self.is_set(index) {
            warn!("bitmap@{:#x}: bit {} already clear", self.region_start, index);
            return Ok(());
        }
        self.put(index, false);
        if let Err(e) = self.persist(store) {
            self.put(index, true);
            return Err(e);
        }
        trace!("bitmap@{:#x}: cleared bit {}", self.region_start, index);
        Ok(())
    }
}
