//! C6: Handle Table.
//!
//! Ephemeral, process-wide map from an open-file handle number to the
//! inode/flags/path it was opened with. Handle numbers are monotonically
//! increasing and never reused within a process lifetime. Guarded by a
//! plain `Mutex`, the same primitive the FUSE session dispatcher uses for
//! its own shared state, since mutations happen from multiple worker
//! threads at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct OpenFile {
    pub inode_id: u64,
    pub flags: i32,
    pub path: String,
}

pub struct HandleTable {
    next: AtomicU64,
    open: Mutex<HashMap<u64, OpenFile>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            next: AtomicU64::new(1),
            open: Mutex::new(HashMap::new()),
        }
    }

    pub fn insert(&self, inode_id: u64, flags: i32, path: String) -> u64 {
        let fh = self.next.fetch_add(1, Ordering::Relaxed);
        self.open
            .lock()
            .unwrap()
            .insert(fh, OpenFile { inode_id, flags, path });
        fh
    }

    pub fn get(&self, fh: u64) -> Option<OpenFile> {
        self.open.lock().unwrap().get(&fh).cloned()
    }

    pub fn remove(&self, fh: u64) -> Option<OpenFile> {
        self.open.lock().unwrap().remove(&fh)
    }

    /// Whether any live handle still references `inode_id`. Consulted when
    /// a link count reaches zero to decide whether deletion must wait for
    /// the last `release` (see spec.md 9, open question 1).
    pub fn is_open(&self, inode_id: u64) -> bool {
        self.open
            .lock()
            .unwrap()
            .values()
            .any(|f| f.inode_id == inode_id)
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
