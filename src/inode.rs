//! C2: Inode Store.
//!
//! CRUD on inode metadata. Every function takes the transaction it runs in;
//! callers (C3/C4/C5) compose several of these inside one `Storage::transaction`
//! so a whole filesystem operation commits or rolls back as a unit.

use rusqlite::{params, OptionalExtension, Transaction};

use crate::error::FsResult;
use crate::storage::now;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    RegularFile,
    Directory,
}

impl FileKind {
    pub fn from_mode(mode: u32) -> FileKind {
        if mode & libc::S_IFMT as u32 == libc::S_IFDIR as u32 {
            FileKind::Directory
        } else {
            FileKind::RegularFile
        }
    }
}

#[derive(Debug, Clone)]
pub struct Inode {
    pub id: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: f64,
    pub mtime: f64,
    pub ctime: f64,
    pub nlink: u32,
}

impl Inode {
    pub fn kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }
}

fn row_to_inode(row: &rusqlite::Row) -> rusqlite::Result<Inode> {
    Ok(Inode {
        id: row.get(0)?,
        mode: row.get(1)?,
        uid: row.get(2)?,
        gid: row.get(3)?,
        size: row.get(4)?,
        atime: row.get(5)?,
        mtime: row.get(6)?,
        ctime: row.get(7)?,
        nlink: row.get(8)?,
    })
}

const SELECT_COLUMNS: &str = "id, mode, uid, gid, size, atime, mtime, ctime, nlink";

/// Allocates a fresh inode. `nlink` starts at 2 for directories (self entry
/// plus `.`), 1 otherwise.
pub fn allocate(txn: &Transaction, mode: u32, uid: u32, gid: u32) -> FsResult<u64> {
    let t = now();
    let nlink: u32 = if FileKind::from_mode(mode) == FileKind::Directory {
        2
    } else {
        1
    };
    txn.execute(
        "INSERT INTO inodes (mode, uid, gid, size, atime, mtime, ctime, nlink)
         VALUES (?1, ?2, ?3, 0, ?4, ?4, ?4, ?5)",
        params![mode, uid, gid, t, nlink],
    )?;
    Ok(txn.last_insert_rowid() as u64)
}

pub fn fetch(txn: &Transaction, id: u64) -> FsResult<Option<Inode>> {
    let inode = txn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM inodes WHERE id = ?1"),
            [id],
            row_to_inode,
        )
        .optional()?;
    Ok(inode)
}

pub fn update_size(txn: &Transaction, id: u64, new_size: u64, new_mtime: f64) -> FsResult<()> {
    txn.execute(
        "UPDATE inodes SET size = ?1, mtime = ?2 WHERE id = ?3",
        params![new_size, new_mtime, id],
    )?;
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimeUpdate {
    pub atime: Option<f64>,
    pub mtime: Option<f64>,
    pub ctime: Option<f64>,
}

pub fn update_times(txn: &Transaction, id: u64, update: TimeUpdate) -> FsResult<()> {
    if let Some(atime) = update.atime {
        txn.execute("UPDATE inodes SET atime = ?1 WHERE id = ?2", params![atime, id])?;
    }
    if let Some(mtime) = update.mtime {
        txn.execute("UPDATE inodes SET mtime = ?1 WHERE id = ?2", params![mtime, id])?;
    }
    if let Some(ctime) = update.ctime {
        txn.execute("UPDATE inodes SET ctime = ?1 WHERE id = ?2", params![ctime, id])?;
    }
    Ok(())
}

/// Replaces only the low 9 permission bits, preserving the file-type bits.
pub fn chmod(txn: &Transaction, id: u64, new_perm: u32) -> FsResult<()> {
    txn.execute(
        "UPDATE inodes
         SET mode = (mode & ~?1) | (?2 & ?1), ctime = ?3
         WHERE id = ?4",
        params![0o7777_i64, new_perm, now(), id],
    )?;
    Ok(())
}

pub fn chown(txn: &Transaction, id: u64, uid: u32, gid: u32) -> FsResult<()> {
    txn.execute(
        "UPDATE inodes SET uid = ?1, gid = ?2, ctime = ?3 WHERE id = ?4",
        params![uid, gid, now(), id],
    )?;
    Ok(())
}

pub fn inc_link(txn: &Transaction, id: u64) -> FsResult<()> {
    txn.execute("UPDATE inodes SET nlink = nlink + 1 WHERE id = ?1", [id])?;
    Ok(())
}

/// Decrements `nlink` and returns the value after decrementing.
pub fn dec_link(txn: &Transaction, id: u64) -> FsResult<i64> {
    txn.execute("UPDATE inodes SET nlink = nlink - 1 WHERE id = ?1", [id])?;
    let nlink: i64 = txn.query_row("SELECT nlink FROM inodes WHERE id = ?1", [id], |r| r.get(0))?;
    Ok(nlink)
}

/// Deletes the inode and any chunks/entries still referencing it. Used once
/// both `nlink <= 0` and no open handle remains (see ops::release).
pub fn purge(txn: &Transaction, id: u64) -> FsResult<()> {
    txn.execute("DELETE FROM file_data WHERE inode_id = ?1", [id])?;
    txn.execute("DELETE FROM entries WHERE inode_id = ?1", [id])?;
    txn.execute("DELETE FROM inodes WHERE id = ?1", [id])?;
    Ok(())
}
