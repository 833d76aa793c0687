//! C5: Filesystem Ops.
//!
//! Assembles C2-C4 into the high-level operations a kernel gateway calls.
//! Each public method here is one `Storage::transaction` — the unit the
//! rest of the spec calls "one kernel-visible operation" — so a crash or a
//! concurrent accessor never observes a half-finished rename or a dangling
//! inode. This module knows nothing about FUSE wire types; `fuse_fs.rs`
//! translates `FsError` to kernel errno values and `Inode` to `FileAttr`.

use crate::chunk;
use crate::dir::{self, RemoveOutcome};
use crate::error::{FsError, FsResult};
use crate::handle::HandleTable;
use crate::inode::{self, FileKind, Inode, TimeUpdate};
use crate::storage::{now, Storage};

pub struct Filesystem {
    storage: Storage,
    handles: HandleTable,
}

#[derive(Debug, Clone, Copy)]
pub struct Statfs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

pub struct CreatedFile {
    pub attr: Inode,
    pub fh: u64,
}

const ACCMODE: i32 = libc::O_ACCMODE;

fn wants_read(flags: i32) -> bool {
    matches!(flags & ACCMODE, libc::O_RDONLY | libc::O_RDWR)
}

impl Filesystem {
    pub fn new(storage: Storage) -> Self {
        Filesystem {
            storage,
            handles: HandleTable::new(),
        }
    }

    /// Purges an inode once it is both unlinked (`nlink <= 0`) and no
    /// handle still has it open (spec.md 9, open question 1).
    fn maybe_purge(&self, txn: &rusqlite::Transaction, outcome: &RemoveOutcome) -> FsResult<()> {
        if outcome.orphaned && !self.handles.is_open(outcome.inode_id) {
            inode::purge(txn, outcome.inode_id)?;
        }
        Ok(())
    }

    pub fn lookup(&self, parent: u64, name: &str) -> FsResult<Inode> {
        self.storage.transaction(|txn| {
            let id = dir::lookup_entry(txn, parent, name)?.ok_or(FsError::NotFound)?;
            inode::fetch(txn, id)?.ok_or(FsError::NotFound)
        })
    }

    pub fn getattr(&self, ino: u64) -> FsResult<Inode> {
        self.storage
            .transaction(|txn| inode::fetch(txn, ino)?.ok_or(FsError::NotFound))
    }

    pub fn mkdir(&self, parent: u64, name: &str, mode: u32, uid: u32, gid: u32) -> FsResult<Inode> {
        self.storage.transaction(|txn| {
            let mode = (mode & 0o7777) | crate::storage::S_IFDIR;
            let id = dir::create_in(txn, parent, name, mode, uid, gid)?;
            inode::fetch(txn, id)?.ok_or(FsError::NotFound)
        })
    }

    pub fn create(
        &self,
        parent: u64,
        name: &str,
        mode: u32,
        uid: u32,
        gid: u32,
        flags: i32,
    ) -> FsResult<CreatedFile> {
        let attr = self.storage.transaction(|txn| {
            let mode = (mode & 0o7777) | crate::storage::S_IFREG;
            let id = dir::create_in(txn, parent, name, mode, uid, gid)?;
            inode::fetch(txn, id)?.ok_or(FsError::NotFound)
        })?;
        let fh = self.handles.insert(attr.id, flags, name.to_string());
        Ok(CreatedFile { attr, fh })
    }

    /// Opens an existing inode, recording a handle. Updates `atime` if the
    /// flags request read access, per spec.md 4.5.
    pub fn open(&self, ino: u64, flags: i32) -> FsResult<u64> {
        self.storage.transaction(|txn| {
            let inode = inode::fetch(txn, ino)?.ok_or(FsError::NotFound)?;
            if wants_read(flags) {
                inode::update_times(
                    txn,
                    inode.id,
                    TimeUpdate {
                        atime: Some(now()),
                        ..Default::default()
                    },
                )?;
            }
            Ok(())
        })?;
        Ok(self.handles.insert(ino, flags, String::new()))
    }

    pub fn read(&self, fh: u64, offset: u64, size: u32) -> FsResult<Vec<u8>> {
        let handle = self.handles.get(fh).ok_or(FsError::BadHandle)?;
        self.storage.transaction(|txn| {
            let data = chunk::read(txn, handle.inode_id, offset, size)?;
            inode::update_times(
                txn,
                handle.inode_id,
                TimeUpdate {
                    atime: Some(now()),
                    ..Default::default()
                },
            )?;
            Ok(data)
        })
    }

    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> FsResult<u32> {
        let handle = self.handles.get(fh).ok_or(FsError::BadHandle)?;
        self.storage
            .transaction(|txn| chunk::write(txn, handle.inode_id, offset, data))
    }

    /// Releases a handle. If the inode it points to was already unlinked
    /// down to `nlink == 0` and this was the last handle, the inode and its
    /// chunks are purged now.
    pub fn release(&self, fh: u64) -> FsResult<()> {
        let Some(handle) = self.handles.remove(fh) else {
            return Err(FsError::BadHandle);
        };
        self.storage.transaction(|txn| {
            if inode::fetch(txn, handle.inode_id)?.is_some() {
                let nlink: i64 = txn.query_row(
                    "SELECT nlink FROM inodes WHERE id = ?1",
                    [handle.inode_id],
                    |r| r.get(0),
                )?;
                if nlink <= 0 && !self.handles.is_open(handle.inode_id) {
                    inode::purge(txn, handle.inode_id)?;
                }
            }
            Ok(())
        })
    }

    pub fn unlink(&self, parent: u64, name: &str) -> FsResult<()> {
        self.storage.transaction(|txn| {
            let target_id = dir::lookup_entry(txn, parent, name)?.ok_or(FsError::NotFound)?;
            let target = inode::fetch(txn, target_id)?.ok_or(FsError::NotFound)?;
            if target.kind() == FileKind::Directory {
                return Err(FsError::IsADirectory);
            }
            let outcome = dir::remove_in(txn, parent, name)?;
            self.maybe_purge(txn, &outcome)
        })
    }

    pub fn rmdir(&self, parent: u64, name: &str) -> FsResult<()> {
        self.storage.transaction(|txn| {
            let target_id = dir::lookup_entry(txn, parent, name)?.ok_or(FsError::NotFound)?;
            let target = inode::fetch(txn, target_id)?.ok_or(FsError::NotFound)?;
            if target.kind() != FileKind::Directory {
                return Err(FsError::NotADirectory);
            }
            let outcome = dir::remove_in(txn, parent, name)?;
            self.maybe_purge(txn, &outcome)
        })
    }

    pub fn rename(
        &self,
        parent: u64,
        name: &str,
        new_parent: u64,
        new_name: &str,
    ) -> FsResult<()> {
        self.storage
            .transaction(|txn| dir::rename_in(txn, parent, name, new_parent, new_name))
    }

    pub fn truncate(&self, ino: u64, new_length: u64) -> FsResult<Inode> {
        self.storage.transaction(|txn| {
            let target = inode::fetch(txn, ino)?.ok_or(FsError::NotFound)?;
            if target.kind() == FileKind::Directory {
                return Err(FsError::IsADirectory);
            }
            chunk::truncate(txn, ino, new_length)?;
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)
        })
    }

    /// Replaces only the 9 permission bits, preserving the file-type bits.
    pub fn chmod(&self, ino: u64, perm: u32) -> FsResult<Inode> {
        self.storage.transaction(|txn| {
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)?;
            inode::chmod(txn, ino, perm & 0o777)?;
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)
        })
    }

    /// Rejects non-root callers with `EPERM`, per spec.md 6.
    pub fn chown(&self, ino: u64, uid: u32, gid: u32, caller_uid: u32) -> FsResult<Inode> {
        if caller_uid != 0 {
            return Err(FsError::PermissionDenied);
        }
        self.storage.transaction(|txn| {
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)?;
            inode::chown(txn, ino, uid, gid)?;
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)
        })
    }

    /// `atime`/`mtime` of `None` for both sets both to now, per spec.md 4.5.
    pub fn utimens(&self, ino: u64, atime: Option<f64>, mtime: Option<f64>) -> FsResult<Inode> {
        self.storage.transaction(|txn| {
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)?;
            let (atime, mtime) = match (atime, mtime) {
                (None, None) => {
                    let t = now();
                    (Some(t), Some(t))
                }
                other => other,
            };
            inode::update_times(
                txn,
                ino,
                TimeUpdate {
                    atime,
                    mtime,
                    ctime: None,
                },
            )?;
            inode::fetch(txn, ino)?.ok_or(FsError::NotFound)
        })
    }

    /// Returns raw entries including `.`/`..`; the gateway adapter passes
    /// them straight through (spec.md 9, open question 2).
    pub fn readdir(&self, ino: u64) -> FsResult<Vec<(String, u64, FileKind)>> {
        self.storage.transaction(|txn| dir::list_in(txn, ino))
    }

    pub fn statfs(&self) -> Statfs {
        Statfs {
            blocks: 10_000,
            bfree: 10_000,
            bavail: 10_000,
            files: 1,
            ffree: 10_000,
            bsize: chunk::CHUNK_SIZE as u32,
            namelen: 255,
            frsize: chunk::CHUNK_SIZE as u32,
        }
    }
}
