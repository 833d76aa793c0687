//! C1: Storage Adapter.
//!
//! Owns the SQLite database file, bootstraps the schema, and hands out
//! pooled connections to callers who each run one transaction at a time.
//! The pool replaces the thread-local-connection trick a single-threaded
//! Python binding can get away with: FUSE dispatches concurrently from a
//! worker pool, so connections here are checked out for the lifetime of one
//! transaction and returned afterward, guarded by the same `Mutex`/`Condvar`
//! pair the underlying FUSE session dispatcher uses for its own shared
//! state.

use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::error::{FsError, FsResult};

pub const ROOT_INODE: u64 = 1;

/// Directory-type bit in `mode`, matching the POSIX `S_IFDIR` value used
/// throughout the schema's `mode` column.
pub const S_IFDIR: u32 = libc::S_IFDIR as u32;
pub const S_IFREG: u32 = libc::S_IFREG as u32;

pub(crate) fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct Pool {
    idle: Mutex<Vec<Connection>>,
    available: Condvar,
    capacity: usize,
    opened: Mutex<usize>,
}

pub struct Storage {
    path: PathBuf,
    pool: Pool,
}

impl Storage {
    /// Opens (creating if needed) the database at `path` and bootstraps the
    /// schema. `capacity` bounds how many connections the pool will ever
    /// open concurrently; size it to the expected worker-thread count.
    pub fn open<P: AsRef<Path>>(path: P, capacity: usize) -> FsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let storage = Storage {
            path,
            pool: Pool {
                idle: Mutex::new(Vec::new()),
                available: Condvar::new(),
                capacity: capacity.max(1),
                opened: Mutex::new(0),
            },
        };
        storage.bootstrap()?;
        Ok(storage)
    }

    fn open_connection(&self) -> FsResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
        Ok(conn)
    }

    fn checkout(&self) -> FsResult<Connection> {
        let mut idle = self.pool.idle.lock().unwrap();
        loop {
            if let Some(conn) = idle.pop() {
                return Ok(conn);
            }
            let mut opened = self.pool.opened.lock().unwrap();
            if *opened < self.pool.capacity {
                *opened += 1;
                drop(opened);
                return self.open_connection();
            }
            drop(opened);
            idle = self.pool.available.wait(idle).unwrap();
        }
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.pool.idle.lock().unwrap();
        idle.push(conn);
        self.pool.available.notify_one();
    }

    /// Runs `f` inside one transaction on a pooled connection. Commits on
    /// `Ok`, rolls back on `Err`. The connection is returned to the pool in
    /// both cases.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction) -> FsResult<T>,
    ) -> FsResult<T> {
        let mut conn = self.checkout()?;
        let result = (|| {
            let txn = conn.transaction()?;
            let value = f(&txn)?;
            txn.commit()?;
            Ok(value)
        })();
        self.checkin(conn);
        result
    }

    fn bootstrap(&self) -> FsResult<()> {
        self.transaction(|txn| {
            txn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS inodes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    mode INTEGER NOT NULL,
                    uid INTEGER NOT NULL,
                    gid INTEGER NOT NULL,
                    size INTEGER NOT NULL DEFAULT 0,
                    atime REAL NOT NULL,
                    mtime REAL NOT NULL,
                    ctime REAL NOT NULL,
                    nlink INTEGER NOT NULL DEFAULT 1
                );
                CREATE TABLE IF NOT EXISTS entries (
                    parent_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    inode_id INTEGER NOT NULL,
                    PRIMARY KEY (parent_id, name)
                );
                CREATE TABLE IF NOT EXISTS file_data (
                    inode_id INTEGER NOT NULL,
                    chunk_num INTEGER NOT NULL,
                    data BLOB NOT NULL,
                    PRIMARY KEY (inode_id, chunk_num)
                );
                CREATE INDEX IF NOT EXISTS idx_entries_inode ON entries(inode_id);
                CREATE INDEX IF NOT EXISTS idx_data_inode ON file_data(inode_id);
                ",
            )?;

            let exists: bool = txn.query_row(
                "SELECT 1 FROM inodes WHERE id = ?1",
                [ROOT_INODE],
                |_| Ok(true),
            ).unwrap_or(false);
            if !exists {
                let uid = nix::unistd::geteuid().as_raw();
                let gid = nix::unistd::getegid().as_raw();
                let t = now();
                txn.execute(
                    "INSERT INTO inodes (id, mode, uid, gid, size, atime, mtime, ctime, nlink)
                     VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5, ?5, 2)",
                    rusqlite::params![ROOT_INODE, S_IFDIR | 0o755, uid, gid, t],
                )?;
                txn.execute(
                    "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, '.', ?1)",
                    [ROOT_INODE],
                )?;
                txn.execute(
                    "INSERT INTO entries (parent_id, name, inode_id) VALUES (?1, '..', ?1)",
                    [ROOT_INODE],
                )?;
            }
            Ok(())
        })
    }
}

/// Convenience used by callers that want a not-found error instead of an
/// `Option` when a single-row lookup comes back empty.
pub(crate) fn require<T>(opt: Option<T>) -> FsResult<T> {
    opt.ok_or(FsError::NotFound)
}
