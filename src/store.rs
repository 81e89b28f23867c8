// src/store.rs
//
// Positioned byte I/O over the backing file. Every write is pushed to the
// OS (and optionally to the device) before returning; nothing is buffered.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::trace;

use crate::error::Result;

#[derive(Debug)]
pub struct BlockStore {
    file: File,
    durable: bool,
}

impl BlockStore {
    /// Opens an existing backing file for reading and writing.
    pub fn open(path: &Path, durable: bool) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, durable })
    }

    /// Creates the backing file, discarding any previous content.
    pub fn create(path: &Path, durable: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file, durable })
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        if self.durable {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Fills `buf` from `offset`; a short read is an I/O failure.
    pub fn read_bytes(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        trace!("write {} bytes at {:#x}", bytes.len(), offset);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file.flush()?;
        if self.durable {
            self.file.sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positioned_io() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockStore::create(&dir.path().join("img"), false).unwrap();
        store.set_len(64).unwrap();
        store.write_bytes(10, b"hello").unwrap();

        let mut buf = [0u8; 5];
        store.read_bytes(10, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(store.len().unwrap(), 64);
    }

    #[test]
    fn short_read_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = BlockStore::create(&dir.path().join("img"), false).unwrap();
        store.set_len(8).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            store.read_bytes(0, &mut buf),
            Err(crate::FsError::Io(_))
        ));
    }
}
