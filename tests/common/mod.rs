//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use zosfs::{FormatOptions, ZosFilesystem};

pub const MB: u64 = 1024 * 1024;

/// A formatted image living in its own temp directory. The directory is
/// removed when the value is dropped.
pub struct Image {
    pub dir: TempDir,
    pub path: PathBuf,
    pub fs: ZosFilesystem,
}

pub fn format_with(options: FormatOptions) -> Image {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.zos");
    let fs = ZosFilesystem::format(&path, &options).unwrap();
    Image { dir, path, fs }
}

/// 1 MB image with 4096-byte clusters: 256 clusters, 32 inodes.
pub fn small_image() -> Image {
    format_with(FormatOptions::with_size(MB).durable_writes(false))
}

/// 64 KB image with 64-byte clusters: P = 16, so the double-indirect
/// range starts at logical index 21.
pub fn tiny_cluster_image() -> Image {
    format_with(
        FormatOptions::with_size(64 * 1024)
            .cluster_size(64)
            .durable_writes(false),
    )
}

/// Re-opens the image behind `img`, dropping the old session first.
pub fn reopen(img: Image) -> Image {
    let Image { dir, path, fs } = img;
    drop(fs);
    let fs = ZosFilesystem::open(&path, &zosfs::FsConfig { durable_writes: false }).unwrap();
    Image { dir, path, fs }
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}
