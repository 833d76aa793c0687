//! Integration tests driving the storage/inode/directory/chunk layers
//! directly through `ops::Filesystem`, the way the teacher's own
//! `integration_tests.rs` exercised its session layer without a live mount.

use sqlitefs::error::FsError;
use sqlitefs::ops::Filesystem;
use sqlitefs::storage::{Storage, ROOT_INODE};

const UID: u32 = 1000;
const GID: u32 = 1000;

fn fresh_fs() -> (tempfile::TempDir, Filesystem) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let storage = Storage::open(&db_path, 4).unwrap();
    (dir, Filesystem::new(storage))
}

fn mkdir(fs: &Filesystem, parent: u64, name: &str) -> u64 {
    fs.mkdir(parent, name, 0o755, UID, GID).unwrap().id
}

fn create(fs: &Filesystem, parent: u64, name: &str) -> (u64, u64) {
    let created = fs.create(parent, name, 0o644, UID, GID, libc::O_RDWR).unwrap();
    (created.attr.id, created.fh)
}

#[test]
fn root_always_present() {
    let (_dir, fs) = fresh_fs();
    let root = fs.getattr(ROOT_INODE).unwrap();
    assert_eq!(root.id, 1);
    assert_eq!(root.kind(), sqlitefs::inode::FileKind::Directory);
    assert_eq!(root.nlink, 2);
}

#[test]
fn name_uniqueness() {
    let (_dir, fs) = fresh_fs();
    create(&fs, ROOT_INODE, "dup.txt");
    let err = fs.create(ROOT_INODE, "dup.txt", 0o644, UID, GID, libc::O_RDWR).unwrap_err();
    assert!(matches!(err, FsError::AlreadyExists));
}

#[test]
fn scenario_s1_basic_write_read() {
    let (_dir, fs) = fresh_fs();
    let (ino, fh) = create(&fs, ROOT_INODE, "hello.txt");
    fs.write(fh, 0, b"Hello, SQLiteFS!").unwrap();
    fs.release(fh).unwrap();

    let attr = fs.getattr(ino).unwrap();
    assert_eq!(attr.size, 16);

    let fh2 = fs.open(ino, libc::O_RDONLY).unwrap();
    assert_eq!(fs.read(fh2, 0, 16).unwrap(), b"Hello, SQLiteFS!");
    assert_eq!(fs.read(fh2, 7, 5).unwrap(), b"SQLit");
}

#[test]
fn scenario_s2_chunk_straddling() {
    let (_dir, fs) = fresh_fs();
    let (ino, fh) = create(&fs, ROOT_INODE, "big.bin");
    let payload = vec![b'X'; 12388];
    fs.write(fh, 0, &payload).unwrap();

    let attr = fs.getattr(ino).unwrap();
    assert_eq!(attr.size, 12388);
    assert_eq!(fs.read(fh, 4046, 100).unwrap(), vec![b'X'; 100]);
}

#[test]
fn scenario_s3_truncate_hole_fidelity() {
    let (_dir, fs) = fresh_fs();
    let (ino, fh) = create(&fs, ROOT_INODE, "t.txt");
    fs.write(fh, 0, b"Hello, World!").unwrap();

    fs.truncate(ino, 5).unwrap();
    assert_eq!(fs.read(fh, 0, 10).unwrap(), b"Hello");

    fs.truncate(ino, 20).unwrap();
    let mut expected = b"Hello".to_vec();
    expected.extend(std::iter::repeat(0u8).take(15));
    assert_eq!(fs.read(fh, 0, 20).unwrap(), expected);

    let fh2 = fs.open(ino, libc::O_RDWR).unwrap();
    fs.write(fh2, 15, b"End").unwrap();
    let attr = fs.getattr(ino).unwrap();
    assert_eq!(attr.size, 20);
    let mut expected = b"Hello".to_vec();
    expected.extend(std::iter::repeat(0u8).take(10));
    expected.extend_from_slice(b"End");
    expected.extend(std::iter::repeat(0u8).take(2));
    assert_eq!(fs.read(fh2, 0, 20).unwrap(), expected);

    fs.write(fh2, 25, b"Extra").unwrap();
    let attr = fs.getattr(ino).unwrap();
    assert_eq!(attr.size, 30);
    let mut expected = b"Hello".to_vec();
    expected.extend(std::iter::repeat(0u8).take(10));
    expected.extend_from_slice(b"End");
    expected.extend(std::iter::repeat(0u8).take(7));
    expected.extend_from_slice(b"Extra");
    assert_eq!(fs.read(fh2, 0, 30).unwrap(), expected);
}

#[test]
fn scenario_s4_rmdir_requires_empty() {
    let (_dir, fs) = fresh_fs();
    let d = mkdir(&fs, ROOT_INODE, "d");
    create(&fs, d, "f");

    let err = fs.rmdir(ROOT_INODE, "d").unwrap_err();
    assert!(matches!(err, FsError::NotEmpty));

    fs.unlink(d, "f").unwrap();
    fs.rmdir(ROOT_INODE, "d").unwrap();

    let err = fs.lookup(ROOT_INODE, "d").unwrap_err();
    assert!(matches!(err, FsError::NotFound));
}

#[test]
fn scenario_s5_rename_across_directories() {
    let (_dir, fs) = fresh_fs();
    let d1 = mkdir(&fs, ROOT_INODE, "d1");
    let d2 = mkdir(&fs, ROOT_INODE, "d2");
    let (file_id, _fh) = create(&fs, d1, "f.txt");

    fs.rename(d1, "f.txt", d2, "moved.txt").unwrap();

    let err = fs.lookup(d1, "f.txt").unwrap_err();
    assert!(matches!(err, FsError::NotFound));
    let moved = fs.lookup(d2, "moved.txt").unwrap();
    assert_eq!(moved.id, file_id);
}

#[test]
fn rename_rejects_moving_directory_into_own_subtree() {
    let (_dir, fs) = fresh_fs();
    let a = mkdir(&fs, ROOT_INODE, "a");
    let b = mkdir(&fs, a, "b");
    let _ = b;

    let err = fs.rename(ROOT_INODE, "a", a, "b2").unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument));
}

#[test]
fn rename_same_parent_same_name_is_noop() {
    let (_dir, fs) = fresh_fs();
    let (file_id, _fh) = create(&fs, ROOT_INODE, "same.txt");
    fs.rename(ROOT_INODE, "same.txt", ROOT_INODE, "same.txt").unwrap();
    let after = fs.lookup(ROOT_INODE, "same.txt").unwrap();
    assert_eq!(after.id, file_id);
}

#[test]
fn unlink_purges_inode_once_unreferenced_and_closed() {
    let (_dir, fs) = fresh_fs();
    let (ino, fh) = create(&fs, ROOT_INODE, "gone.txt");
    fs.write(fh, 0, b"data").unwrap();

    fs.unlink(ROOT_INODE, "gone.txt").unwrap();
    // Still open: getattr must keep working through the live handle's inode id.
    assert!(fs.getattr(ino).is_ok());

    fs.release(fh).unwrap();
    let err = fs.getattr(ino).unwrap_err();
    assert!(matches!(err, FsError::NotFound));
}

#[test]
fn chmod_preserves_file_type() {
    let (_dir, fs) = fresh_fs();
    let (ino, _fh) = create(&fs, ROOT_INODE, "perm.txt");
    let attr = fs.chmod(ino, 0o777).unwrap();
    assert_eq!(attr.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
    assert_eq!(attr.mode & 0o777, 0o777);
}

#[test]
fn chown_rejects_non_root() {
    let (_dir, fs) = fresh_fs();
    let (ino, _fh) = create(&fs, ROOT_INODE, "owned.txt");
    let err = fs.chown(ino, 2000, 2000, UID).unwrap_err();
    assert!(matches!(err, FsError::PermissionDenied));
    fs.chown(ino, 2000, 2000, 0).unwrap();
}

#[test]
fn readdir_includes_dot_entries_without_duplication() {
    let (_dir, fs) = fresh_fs();
    mkdir(&fs, ROOT_INODE, "sub");
    let entries = fs.readdir(ROOT_INODE).unwrap();
    let dot_count = entries.iter().filter(|(name, _, _)| name == ".").count();
    let dotdot_count = entries.iter().filter(|(name, _, _)| name == "..").count();
    assert_eq!(dot_count, 1);
    assert_eq!(dotdot_count, 1);
    assert!(entries.iter().any(|(name, _, _)| name == "sub"));
}

#[test]
fn persistence_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("persist.db");
    {
        let storage = Storage::open(&db_path, 2).unwrap();
        let fs = Filesystem::new(storage);
        let (_ino, fh) = create(&fs, ROOT_INODE, "keep.txt");
        fs.write(fh, 0, b"still here").unwrap();
        fs.release(fh).unwrap();
    }
    {
        let storage = Storage::open(&db_path, 2).unwrap();
        let fs = Filesystem::new(storage);
        let entry = fs.lookup(ROOT_INODE, "keep.txt").unwrap();
        let fh = fs.open(entry.id, libc::O_RDONLY).unwrap();
        assert_eq!(fs.read(fh, 0, 10).unwrap(), b"still here");
    }
}
