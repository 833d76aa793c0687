//! C3: Directory Index.
//!
//! Parent-id+name -> inode mapping, path resolution, listing, and
//! cycle-free rename. Mirrors `entries(parent_id, name, inode_id)` from the
//! schema; `.`/`..` are ordinary rows here, not synthesized.
//!
//! The spec's contract is phrased in terms of parent *paths*, which is what
//! a path-based FUSE binding hands a filesystem. The lowlevel protocol this
//! crate actually sits on (`fuser`) hands callbacks a parent *inode id*
//! instead, resolved once by the kernel's own dentry cache — so the real
//! work below (`create_in`/`remove_in`/`rename_in`) takes ids directly, and
//! `create`/`remove`/`rename` are thin path-resolving wrappers kept for
//! tests and tools that still think in paths.

use rusqlite::{params, OptionalExtension, Transaction};

use crate::error::{FsError, FsResult};
use crate::inode::{self, FileKind, Inode};
use crate::storage::{now, ROOT_INODE};

/// Looks up a single `(parent, name)` entry's inode id.
pub fn lookup_entry(txn: &Transaction, parent_id: u64, name: &str) -> FsResult<Option<u64>> {
    let id = txn
        .query_row(
            "SELECT inode_id FROM entries WHERE parent_id = ?1 AND name = ?2",
            params![parent_id, name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

/// Walks an absolute, `/`-separated path from root. Empty components
/// (leading/trailing/doubled slashes) are ignored; `.`/`..` resolve through
/// their stored entries.
pub fn resolve(txn: &Transaction, path: &str) -> FsResult<Option<Inode>> {
    let mut current = ROOT_INODE;
    for part in path.split('/').filter(|p| !p.is_empty()) {
        match lookup_entry(txn, current, part)? {
            Some(id) => current = id,
            None => return Ok(None),
        }
    }
    inode::fetch(txn, current)
}

pub fn resolve_id(txn: &Transaction, path: &str) -> FsResult<u64> {
    match resolve(txn, path)? {
        Some(i) => Ok(i.id),
        None => Err(FsError::NotFound),
    }
}

pub(crate) fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\0') {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

/// Creates a new inode and links it under `parent_id` as `name`. If the new
/// inode is a directory, also inserts its `.`/`..` entries.
pub fn create_in(
    txn: &Transaction,
    parent_id: u64,
    name: &str,
    mode: u32,
    uid: u32,
    gid: u32,
) -> FsResult<u64> {
    validate_name(name)?;
    if inode::fetch(txn, parent_id)?.is_none() {
        return Err(FsError::NotFound);
    }
    if lookup_entry(txn, parent_id, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }

    let new_id = inode::allocate(txn, mode, uid, gid)?;
    txn.execute(
        "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, ?2, ?3)",
        params![parent_id, name, new_id],
    )?;
    if FileKind::from_mode(mode) == FileKind::Directory {
        txn.execute(
            "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, '.', ?1)",
            [new_id],
        )?;
        txn.execute(
            "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, '..', ?2)",
            params![new_id, parent_id],
        )?;
    }
    Ok(new_id)
}

pub fn create(
    txn: &Transaction,
    parent_path: &str,
    name: &str,
    mode: u32,
    uid: u32,
    gid: u32,
) -> FsResult<u64> {
    let parent_id = resolve_id(txn, parent_path)?;
    create_in(txn, parent_id, name, mode, uid, gid)
}

/// Outcome of removing a directory entry: the inode it pointed at, and
/// whether that inode's link count reached zero (a candidate for purge,
/// deferred by the caller until no handle still references it).
pub struct RemoveOutcome {
    pub inode_id: u64,
    pub was_directory: bool,
    pub orphaned: bool,
}

pub fn remove_in(txn: &Transaction, parent_id: u64, name: &str) -> FsResult<RemoveOutcome> {
    let inode_id = lookup_entry(txn, parent_id, name)?.ok_or(FsError::NotFound)?;
    let target = inode::fetch(txn, inode_id)?.ok_or(FsError::NotFound)?;
    let was_directory = target.kind() == FileKind::Directory;

    if was_directory {
        let extra: i64 = txn.query_row(
            "SELECT COUNT(*) FROM entries WHERE parent_id = ?1 AND name NOT IN ('.', '..')",
            [inode_id],
            |row| row.get(0),
        )?;
        if extra > 0 {
            return Err(FsError::NotEmpty);
        }
    }

    txn.execute(
        "DELETE FROM entries WHERE parent_id = ?1 AND name = ?2",
        params![parent_id, name],
    )?;
    let nlink = inode::dec_link(txn, inode_id)?;
    if was_directory {
        // Drop the directory's own `.`/`..` so a later purge has nothing
        // dangling to clean up.
        txn.execute("DELETE FROM entries WHERE parent_id = ?1", [inode_id])?;
    }

    Ok(RemoveOutcome {
        inode_id,
        was_directory,
        orphaned: nlink <= 0,
    })
}

pub fn remove(txn: &Transaction, parent_path: &str, name: &str) -> FsResult<RemoveOutcome> {
    let parent_id = resolve_id(txn, parent_path)?;
    remove_in(txn, parent_id, name)
}

/// Lists all entries under `dir_id`, including `.`/`..`, in storage order.
pub fn list_in(txn: &Transaction, dir_id: u64) -> FsResult<Vec<(String, u64, FileKind)>> {
    let dir = inode::fetch(txn, dir_id)?.ok_or(FsError::NotFound)?;
    if dir.kind() != FileKind::Directory {
        return Err(FsError::NotADirectory);
    }
    let mut stmt = txn.prepare("SELECT name, inode_id FROM entries WHERE parent_id = ?1")?;
    let rows = stmt.query_map([dir_id], |row| {
        let name: String = row.get(0)?;
        let inode_id: u64 = row.get(1)?;
        Ok((name, inode_id))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (name, inode_id) = row?;
        let mode: u32 = txn.query_row("SELECT mode FROM inodes WHERE id = ?1", [inode_id], |r| {
            r.get(0)
        })?;
        out.push((name, inode_id, FileKind::from_mode(mode)));
    }
    Ok(out)
}

pub fn list(txn: &Transaction, path: &str) -> FsResult<Vec<(String, u64, FileKind)>> {
    let dir_id = resolve_id(txn, path)?;
    list_in(txn, dir_id)
}

/// Walks from `start` upward via `..` entries, stopping at root or at the
/// first missing `..`. Returns true if `target` is on that path (i.e.
/// `start` is inside `target`'s subtree).
fn is_within_subtree(txn: &Transaction, start: u64, target: u64) -> FsResult<bool> {
    let mut current = start;
    loop {
        if current == target {
            return Ok(true);
        }
        if current == ROOT_INODE {
            return Ok(false);
        }
        match lookup_entry(txn, current, "..")? {
            Some(parent) => current = parent,
            None => return Ok(false),
        }
    }
}

pub fn rename_in(
    txn: &Transaction,
    old_parent_id: u64,
    old_name: &str,
    new_parent_id: u64,
    new_name: &str,
) -> FsResult<()> {
    validate_name(old_name)?;
    validate_name(new_name)?;

    let inode_id = lookup_entry(txn, old_parent_id, old_name)?.ok_or(FsError::NotFound)?;

    if old_parent_id == new_parent_id && old_name == new_name {
        return Ok(());
    }
    if inode::fetch(txn, new_parent_id)?.is_none() {
        return Err(FsError::NotFound);
    }
    if lookup_entry(txn, new_parent_id, new_name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }
    if inode_id == ROOT_INODE {
        return Err(FsError::InvalidArgument);
    }

    let moved = inode::fetch(txn, inode_id)?.ok_or(FsError::NotFound)?;
    if moved.kind() == FileKind::Directory
        && old_parent_id != new_parent_id
        && is_within_subtree(txn, new_parent_id, inode_id)?
    {
        return Err(FsError::InvalidArgument);
    }

    txn.execute(
        "DELETE FROM entries WHERE parent_id = ?1 AND name = ?2",
        params![old_parent_id, old_name],
    )?;
    txn.execute(
        "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, ?2, ?3)",
        params![new_parent_id, new_name, inode_id],
    )?;
    if moved.kind() == FileKind::Directory && old_parent_id != new_parent_id {
        txn.execute(
            "UPDATE entries SET inode_id = ?1 WHERE parent_id = ?2 AND name = '..'",
            params![new_parent_id, inode_id],
        )?;
    }
    txn.execute(
        "UPDATE inodes SET ctime = ?1 WHERE id = ?2",
        params![now(), inode_id],
    )?;
    Ok(())
}

pub fn rename(
    txn: &Transaction,
    old_parent_path: &str,
    old_name: &str,
    new_parent_path: &str,
    new_name: &str,
) -> FsResult<()> {
    let old_parent_id = resolve_id(txn, old_parent_path)?;
    let new_parent_id = resolve_id(txn, new_parent_path)?;
    rename_in(txn, old_parent_id, old_name, new_parent_id, new_name)
}
