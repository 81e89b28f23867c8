mod common;

use std::fs;

use common::{reopen, small_image, MB};
use zosfs::{
    FormatOptions, FsError, InodeDisk, ZosFilesystem, NULL_CLUSTER, ROOT_INODE_ID,
    ZOSFS_CLUSTER_SIZE,
};

#[test]
fn format_one_megabyte() {
    let img = small_image();
    let sb = img.fs.superblock();
    assert_eq!(sb.cluster_size, ZOSFS_CLUSTER_SIZE);
    assert_eq!(sb.cluster_count, 256);
    assert_eq!(sb.inode_count, 32);
    assert_eq!(sb.disk_size as u64, MB);

    let root = img.fs.read_inode(img.fs.root_inode()).unwrap();
    assert_eq!(img.fs.root_inode(), ROOT_INODE_ID);
    assert!(root.is_directory);
    assert_eq!(root.parent, root.id);
    assert_eq!(root.size, 0);
    assert!(img.fs.is_inode_allocated(ROOT_INODE_ID));

    // Backing file covers every cluster.
    let len = fs::metadata(&img.path).unwrap().len();
    assert_eq!(len, sb.image_len());
}

#[test]
fn add_then_find() {
    let mut img = small_image();
    let root = img.fs.root_inode();
    img.fs.add_to_dir(root, "docs", 5).unwrap();
    assert_eq!(img.fs.find_in_dir(root, "docs").unwrap(), 5);
    assert!(matches!(img.fs.find_in_dir(root, "nope"), Err(FsError::NotFound)));
}

#[test]
fn full_directory_cluster_grows_directory() {
    let mut img = small_image();
    let root = img.fs.root_inode();
    let per_cluster = img.fs.superblock().entries_per_cluster();
    assert_eq!(per_cluster, 256);

    for i in 0..per_cluster {
        img.fs
            .add_to_dir(root, &format!("f{}", i), 1 + (i as u32 % 31))
            .unwrap();
    }
    assert_eq!(img.fs.read_inode(root).unwrap().size, ZOSFS_CLUSTER_SIZE);

    img.fs.add_to_dir(root, "overflow", 7).unwrap();
    let dir = img.fs.read_inode(root).unwrap();
    assert_eq!(dir.size, 2 * ZOSFS_CLUSTER_SIZE);
    assert_ne!(dir.direct[1], NULL_CLUSTER);
    assert_eq!(img.fs.find_in_dir(root, "overflow").unwrap(), 7);
    assert_eq!(img.fs.find_in_dir(root, "f0").unwrap(), 1);
}

#[test]
fn first_single_indirect_index() {
    let mut img = small_image();
    let id = img.fs.alloc_inode().unwrap();
    let mut inode = InodeDisk::file(id, ROOT_INODE_ID);
    let x = img.fs.alloc_cluster().unwrap();

    img.fs.set_file_cluster(&mut inode, 5, x).unwrap();
    assert_ne!(inode.indirect1, NULL_CLUSTER);
    assert!(img.fs.data_bitmap().is_set(inode.indirect1));
    assert_eq!(img.fs.get_file_cluster(&inode, 5).unwrap(), x);
    // Neighbours stay sparse.
    assert_eq!(img.fs.get_file_cluster(&inode, 6).unwrap(), NULL_CLUSTER);
}

#[test]
fn removed_slot_is_reused() {
    let mut img = small_image();
    let root = img.fs.root_inode();
    img.fs.add_to_dir(root, "a", 1).unwrap();
    img.fs.add_to_dir(root, "b", 2).unwrap();
    let size = img.fs.read_inode(root).unwrap().size;

    assert_eq!(img.fs.remove_from_dir(root, "a").unwrap(), 1);
    img.fs.add_to_dir(root, "c", 3).unwrap();

    assert_eq!(img.fs.read_inode(root).unwrap().size, size);
    let names: Vec<String> = img.fs.dir_slots(root).unwrap().iter().map(|s| s.name_str()).collect();
    // "c" took the first slot, ahead of "b".
    assert_eq!(names, vec!["c".to_string(), "b".to_string()]);
}

#[test]
fn exhausting_clusters_reports_no_space() {
    let mut img = small_image();
    let allocatable = img.fs.superblock().cluster_count - 1;
    let mut seen = Vec::new();
    for _ in 0..allocatable {
        let c = img.fs.alloc_cluster().unwrap();
        assert_ne!(c, NULL_CLUSTER);
        assert!(!seen.contains(&c));
        seen.push(c);
    }
    assert!(matches!(img.fs.alloc_cluster(), Err(FsError::NoSpace)));
}

#[test]
fn exhausting_inodes_reports_no_space() {
    let mut img = small_image();
    for _ in 1..img.fs.superblock().inode_count {
        img.fs.alloc_inode().unwrap();
    }
    assert!(matches!(img.fs.alloc_inode(), Err(FsError::NoSpace)));
}

#[test]
fn allocation_sets_persisted_bit() {
    let mut img = small_image();
    let c = img.fs.alloc_cluster().unwrap();
    let i = img.fs.alloc_inode().unwrap();
    assert!(img.fs.data_bitmap().is_set(c));
    assert!(img.fs.inode_bitmap().is_set(i));

    let img = reopen(img);
    assert!(img.fs.data_bitmap().is_set(c));
    assert!(img.fs.inode_bitmap().is_set(i));
    assert!(!img.fs.data_bitmap().is_set(c + 1));
}

#[test]
fn freed_cluster_is_handed_out_again() {
    let mut img = small_image();
    let a = img.fs.alloc_cluster().unwrap();
    let b = img.fs.alloc_cluster().unwrap();
    img.fs.free_cluster(a).unwrap();
    assert_eq!(img.fs.alloc_cluster().unwrap(), a);
    assert!(img.fs.data_bitmap().is_set(b));
    assert!(matches!(img.fs.free_cluster(0), Err(FsError::InvalidId(0))));
}

#[test]
fn set_then_get_over_direct_and_indirect_range() {
    let mut img = small_image();
    let id = img.fs.alloc_inode().unwrap();
    let mut inode = InodeDisk::file(id, ROOT_INODE_ID);
    let p = img.fs.superblock().pointers_per_cluster();

    for idx in [0, 1, 4, 5, 6, 100, 5 + p - 1] {
        let c = 10 + idx % 200;
        img.fs.set_file_cluster(&mut inode, idx, c).unwrap();
        assert_eq!(img.fs.get_file_cluster(&inode, idx).unwrap(), c);
    }
}

#[test]
fn inode_write_read_identical() {
    let mut img = small_image();
    let id = img.fs.alloc_inode().unwrap();
    let inode = InodeDisk {
        id,
        is_directory: false,
        references: 1,
        size: 12345,
        direct: [3, 4, 5, 6, 7],
        indirect1: 8,
        indirect2: 9,
        parent: ROOT_INODE_ID,
    };
    img.fs.write_inode(id, &inode).unwrap();
    assert_eq!(img.fs.read_inode(id).unwrap(), inode);

    let img = reopen(img);
    assert_eq!(img.fs.read_inode(id).unwrap(), inode);
}

#[test]
fn dotdot_resolves_to_parent() {
    let mut img = small_image();
    let a = img.fs.make_dir("/a").unwrap();
    let b = img.fs.make_dir("/a/b").unwrap();
    assert_eq!(img.fs.resolve_path("/a/b").unwrap(), b);
    assert_eq!(img.fs.resolve_path("/a/b/..").unwrap(), a);
    assert_eq!(img.fs.resolve_path("/a/b/..").unwrap(), img.fs.resolve_path("/a").unwrap());
    assert_eq!(img.fs.resolve_path("/..").unwrap(), ROOT_INODE_ID);
}

#[test]
fn structure_survives_reopen() {
    let mut img = small_image();
    img.fs.make_dir("/docs").unwrap();
    img.fs.create_file("/docs/note", b"hello").unwrap();

    let img = reopen(img);
    assert_eq!(img.fs.read_file("/docs/note").unwrap(), b"hello");
    let names: Vec<String> = img.fs.list_path("/").unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["docs".to_string()]);
}

#[test]
fn open_rejects_foreign_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("junk");
    fs::write(&path, vec![0xAAu8; 4096]).unwrap();
    let err = ZosFilesystem::open(&path, &Default::default()).unwrap_err();
    assert!(matches!(err, FsError::NotFormatted));

    let short = dir.path().join("short");
    fs::write(&short, b"ZOS").unwrap();
    assert!(matches!(
        ZosFilesystem::open(&short, &Default::default()),
        Err(FsError::NotFormatted)
    ));
}

#[test]
fn open_rejects_truncated_image() {
    let img = small_image();
    let path = img.path.clone();
    drop(img.fs);
    let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(8192).unwrap();
    drop(file);
    assert!(matches!(
        ZosFilesystem::open(&path, &Default::default()),
        Err(FsError::InvalidLayout(_))
    ));
}

#[test]
fn format_rejects_tiny_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk");
    let err = ZosFilesystem::format(&path, &FormatOptions::with_size(4096 * 4)).unwrap_err();
    assert!(matches!(err, FsError::InvalidLayout(_)));
}
