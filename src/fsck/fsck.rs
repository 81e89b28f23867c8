// src/fsck/fsck.rs
//
// Checks run in order over one snapshot of the image: superblock, per-inode
// pointers, cross-inode cluster sharing, directory tree, bitmap vs usage,
// orphans. Every problem is collected; nothing is repaired.

use std::collections::HashMap;

use log::debug;

use super::{fsck_backend::FsckBackend, fsck_types::*};
use crate::disk::{CLUSTERS_PER_INODE, NULL_CLUSTER};
use crate::error::Result;

struct Snapshot {
    sb: Superblock,
    inodes: Vec<Inode>,
    bitmap: Vec<bool>,
    dirs: HashMap<u32, Vec<Dirent>>,
}

impl Snapshot {
    fn inode(&self, id: u32) -> Option<&Inode> {
        self.inodes.get(id as usize)
    }

    fn live(&self) -> impl Iterator<Item = &Inode> {
        self.inodes.iter().filter(|i| i.allocated)
    }
}

fn load<B: FsckBackend>(backend: &B) -> Result<Snapshot> {
    let sb = backend.load_superblock()?;
    let inodes = backend.load_all_inodes()?;
    let bitmap = backend.load_cluster_bitmap()?;

    let mut dirs = HashMap::new();
    for inode in inodes.iter().filter(|i| i.allocated && i.is_dir) {
        dirs.insert(inode.id, backend.read_dir(inode.id)?);
    }
    Ok(Snapshot { sb, inodes, bitmap, dirs })
}

fn check_superblock(snap: &Snapshot, report: &mut FsckReport) {
    let sb = &snap.sb;

    if !sb.signature_ok {
        report.errors.push("Superblock: bad signature".into());
    }

    if sb.cluster_count < CLUSTERS_PER_INODE {
        report.errors.push(format!(
            "Superblock: cluster_count = {} is too small",
            sb.cluster_count
        ));
        report.clusters_ok = false;
    }

    if sb.inode_count == 0 {
        report.errors.push("Superblock: inode_count cannot be 0".into());
        report.inodes_ok = false;
    }

    if sb.inode_count as usize != snap.inodes.len() {
        report.errors.push(format!(
            "Superblock: inode_count = {}, but the table holds {} inodes",
            sb.inode_count,
            snap.inodes.len()
        ));
        report.inodes_ok = false;
    }

    if sb.cluster_count as usize != snap.bitmap.len() {
        report.errors.push(format!(
            "Superblock: cluster_count = {}, but the bitmap has {} entries",
            sb.cluster_count,
            snap.bitmap.len()
        ));
        report.clusters_ok = false;
    }

    if sb.root_inode >= sb.inode_count {
        report.errors.push(format!(
            "Superblock: root inode ({}) out of range",
            sb.root_inode
        ));
        report.inodes_ok = false;
    }
}

fn check_inodes_basic(snap: &Snapshot, report: &mut FsckReport) {
    let total = snap.sb.cluster_count;
    let cluster_size = snap.sb.cluster_size as u64;

    for inode in snap.live() {
        // Sparse files may hold fewer clusters than their size covers, never more.
        if cluster_size > 0 {
            let span = (inode.size + cluster_size - 1) / cluster_size;
            if inode.data.len() as u64 > span {
                report.errors.push(format!(
                    "Inode {}: size {} covers {} clusters, but {} are attached",
                    inode.id,
                    inode.size,
                    span,
                    inode.data.len()
                ));
                report.inodes_ok = false;
            }
        }

        for cluster in inode.clusters() {
            if cluster == NULL_CLUSTER || cluster >= total {
                report.errors.push(format!(
                    "Inode {}: cluster pointer out of range ({})",
                    inode.id, cluster
                ));
                report.inodes_ok = false;
            }
        }

        let mut seen = Vec::new();
        for cluster in inode.clusters() {
            if seen.contains(&cluster) {
                report.errors.push(format!(
                    "Inode {}: cluster {} referenced twice",
                    inode.id, cluster
                ));
                report.inodes_ok = false;
            } else {
                seen.push(cluster);
            }
        }
    }
}

fn check_clusters_global(snap: &Snapshot, report: &mut FsckReport) {
    let mut owner: HashMap<u32, u32> = HashMap::new();

    for inode in snap.live() {
        let mut mine: Vec<u32> = inode.clusters().collect();
        mine.sort_unstable();
        mine.dedup();
        for cluster in mine {
            if let Some(&other) = owner.get(&cluster) {
                report.errors.push(format!(
                    "Cluster {} shared by inodes {} and {}",
                    cluster, other, inode.id
                ));
                report.clusters_ok = false;
            } else {
                owner.insert(cluster, inode.id);
            }
        }
    }
}

fn check_dirs(snap: &Snapshot, report: &mut FsckReport) {
    let root = snap.sb.root_inode;

    match snap.inode(root) {
        None => return,
        Some(r) if !r.allocated => {
            report.errors.push("Root inode is not allocated".into());
            report.dirs_ok = false;
            return;
        }
        Some(r) => {
            if !r.is_dir {
                report.errors.push("Root inode is not a directory".into());
                report.dirs_ok = false;
            }
            if r.parent != root {
                report.errors.push(format!(
                    "Root inode: parent is {}, expected itself",
                    r.parent
                ));
                report.dirs_ok = false;
            }
        }
    }

    let mut ids: Vec<&u32> = snap.dirs.keys().collect();
    ids.sort_unstable();
    for &dir in ids {
        for entry in &snap.dirs[&dir] {
            if entry.name.is_empty() {
                report.errors.push(format!("Directory {}: entry with empty name", dir));
                report.dirs_ok = false;
            }

            if entry.inode == root {
                report.errors.push(format!(
                    "Directory {}: entry '{}' points at the root inode",
                    dir, entry.name
                ));
                report.dirs_ok = false;
                continue;
            }

            let Some(target) = snap.inode(entry.inode) else {
                report.errors.push(format!(
                    "Directory {}: entry '{}' points at missing inode {}",
                    dir, entry.name, entry.inode
                ));
                report.dirs_ok = false;
                continue;
            };

            if !target.allocated {
                report.errors.push(format!(
                    "Directory {}: entry '{}' points at free inode {}",
                    dir, entry.name, entry.inode
                ));
                report.dirs_ok = false;
                continue;
            }

            if target.parent != dir {
                report.errors.push(format!(
                    "Inode {} ('{}'): parent is {}, but it is listed in {}",
                    target.id, entry.name, target.parent, dir
                ));
                report.dirs_ok = false;
            }
        }
    }
}

fn check_bitmap_global(snap: &Snapshot, report: &mut FsckReport) {
    let total = snap.sb.cluster_count as usize;
    if snap.bitmap.len() != total {
        // Already reported by the superblock check.
        return;
    }

    let mut used_by_inodes = vec![false; total];
    for inode in snap.live() {
        for cluster in inode.clusters() {
            if (cluster as usize) < total {
                used_by_inodes[cluster as usize] = true;
            }
        }
    }

    // Cluster 0 is the null pointer and never allocated.
    for cluster in 1..total {
        let bitmap_says_used = snap.bitmap[cluster];
        let inode_says_used = used_by_inodes[cluster];

        if bitmap_says_used && !inode_says_used {
            report.errors.push(format!(
                "Bitmap marks cluster {} used, but no inode references it",
                cluster
            ));
            report.clusters_ok = false;
        }

        if !bitmap_says_used && inode_says_used {
            report.errors.push(format!(
                "Bitmap marks cluster {} free, but an inode references it",
                cluster
            ));
            report.clusters_ok = false;
        }
    }
}

fn check_orphan_inodes(snap: &Snapshot, report: &mut FsckReport) {
    let mut referenced = vec![false; snap.inodes.len()];

    if let Some(slot) = referenced.get_mut(snap.sb.root_inode as usize) {
        *slot = true;
    }

    for entries in snap.dirs.values() {
        for entry in entries {
            if let Some(slot) = referenced.get_mut(entry.inode as usize) {
                *slot = true;
            }
        }
    }

    for inode in snap.live() {
        if !referenced[inode.id as usize] {
            report.errors.push(format!("Inode {} is orphaned", inode.id));
            report.inodes_ok = false;
        }
    }
}

pub fn run_fsck<B: FsckBackend>(backend: &B) -> Result<FsckReport> {
    let snap = load(backend)?;
    let mut report = FsckReport::new();

    check_superblock(&snap, &mut report);
    check_inodes_basic(&snap, &mut report);
    check_clusters_global(&snap, &mut report);
    check_dirs(&snap, &mut report);
    check_bitmap_global(&snap, &mut report);
    check_orphan_inodes(&snap, &mut report);

    debug!("fsck: {} problem(s)", report.errors.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsck::mock::MockBackend;

    fn inode(id: u32, is_dir: bool, parent: u32, data: Vec<u32>) -> Inode {
        Inode {
            id,
            allocated: true,
            is_dir,
            size: data.len() as u64 * 64,
            parent,
            data,
            pointers: vec![],
        }
    }

    fn free_inode(id: u32) -> Inode {
        Inode {
            id,
            allocated: false,
            is_dir: false,
            size: 0,
            parent: 0,
            data: vec![],
            pointers: vec![],
        }
    }

    fn dirent(name: &str, inode: u32) -> Dirent {
        Dirent {
            inode,
            name: name.into(),
        }
    }

    /// root (dir, cluster 1) -> "file" (inode 1, cluster 2)
    fn clean() -> MockBackend {
        let mut bitmap = vec![false; 16];
        bitmap[1] = true;
        bitmap[2] = true;
        MockBackend {
            superblock: Superblock {
                signature_ok: true,
                inode_count: 2,
                cluster_count: 16,
                cluster_size: 64,
                root_inode: 0,
            },
            inodes: vec![inode(0, true, 0, vec![1]), inode(1, false, 0, vec![2])],
            dirs: vec![vec![dirent("file", 1)], vec![]],
            bitmap,
        }
    }

    fn has(report: &FsckReport, needle: &str) -> bool {
        report.errors.iter().any(|e| e.contains(needle))
    }

    #[test]
    fn clean_image_passes() {
        let report = run_fsck(&clean()).unwrap();
        assert!(report.is_clean(), "{:?}", report.errors);
        assert!(report.clusters_ok && report.inodes_ok && report.dirs_ok);
    }

    #[test]
    fn bitmap_disagreement_both_ways() {
        let mut backend = clean();
        backend.bitmap[2] = false;
        backend.bitmap[7] = true;
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "cluster 2 free"));
        assert!(has(&report, "cluster 7 used"));
        assert!(!report.clusters_ok);
    }

    #[test]
    fn shared_and_out_of_range_clusters() {
        let mut backend = clean();
        backend.inodes[1].data = vec![1, 99];
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "Cluster 1 shared by inodes 0 and 1"));
        assert!(has(&report, "out of range (99)"));
    }

    #[test]
    fn dentry_pointing_at_root() {
        let mut backend = clean();
        backend.dirs[0].push(dirent("loop", 0));
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "points at the root inode"));
        assert!(!report.dirs_ok);
    }

    #[test]
    fn dangling_entry_and_orphan() {
        let mut backend = clean();
        backend.superblock.inode_count = 3;
        backend.inodes.push(free_inode(2));
        backend.dirs.push(vec![]);
        backend.dirs[0] = vec![dirent("gone", 2)];
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "points at free inode 2"));
        assert!(has(&report, "Inode 1 is orphaned"));
    }

    #[test]
    fn size_shorter_than_attached_clusters() {
        let mut backend = clean();
        backend.inodes[1].data = vec![2, 3];
        backend.inodes[1].size = 10;
        backend.bitmap[3] = true;
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "Inode 1: size 10 covers 1 clusters, but 2 are attached"));
        assert!(!report.inodes_ok);
    }

    #[test]
    fn wrong_parent_field() {
        let mut backend = clean();
        backend.inodes[1].parent = 1;
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "parent is 1, but it is listed in 0"));
    }

    #[test]
    fn root_must_be_directory() {
        let mut backend = clean();
        backend.inodes[0].is_dir = false;
        backend.dirs[0].clear();
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "Root inode is not a directory"));
    }

    #[test]
    fn superblock_mismatches() {
        let mut backend = clean();
        backend.superblock.signature_ok = false;
        backend.superblock.inode_count = 5;
        let report = run_fsck(&backend).unwrap();
        assert!(has(&report, "bad signature"));
        assert!(has(&report, "inode_count = 5"));
    }
}
