//! C7: FUSE gateway.
//!
//! Implements `fuser::Filesystem`, translating kernel callbacks into C5
//! `ops::Filesystem` calls and `FsError` back into `reply.error(errno)`.
//! No SQL and no POSIX-semantics decisions live here — this module is pure
//! wire translation, the same separation the teacher's own `examples/simple.rs`
//! keeps between the trait impl and the backing store.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem as FuseFilesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use log::{debug, warn};

use crate::error::FsError;
use crate::inode::{FileKind, Inode};
use crate::ops;

const TTL: Duration = Duration::from_secs(1);

fn to_system_time(secs: f64) -> SystemTime {
    if secs >= 0.0 {
        UNIX_EPOCH + Duration::from_secs_f64(secs)
    } else {
        UNIX_EPOCH
    }
}

fn to_file_attr(inode: &Inode) -> FileAttr {
    let kind = match inode.kind() {
        FileKind::Directory => FileType::Directory,
        FileKind::RegularFile => FileType::RegularFile,
    };
    FileAttr {
        ino: inode.id,
        size: inode.size,
        blocks: inode.size.div_ceil(512),
        atime: to_system_time(inode.atime),
        mtime: to_system_time(inode.mtime),
        ctime: to_system_time(inode.ctime),
        crtime: to_system_time(inode.ctime),
        kind,
        perm: (inode.mode & 0o777) as u16,
        nlink: inode.nlink,
        uid: inode.uid,
        gid: inode.gid,
        rdev: 0,
        blksize: 4096,
        flags: 0,
    }
}

fn name_str(name: &OsStr) -> Option<&str> {
    std::str::from_utf8(name.as_bytes()).ok()
}

/// Converts a `TimeOrNow` setattr argument into the epoch-seconds `f64` the
/// storage layer stores times as.
fn resolve_time(t: TimeOrNow) -> f64 {
    let system_time = match t {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    };
    system_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

pub struct SqliteFs {
    ops: ops::Filesystem,
}

impl SqliteFs {
    pub fn new(ops: ops::Filesystem) -> Self {
        SqliteFs { ops }
    }
}

impl FuseFilesystem for SqliteFs {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.lookup(parent, name) {
            Ok(inode) => reply.entry(&TTL, &to_file_attr(&inode), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.ops.getattr(ino) {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(&inode)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let caller_uid = _req.uid();
        let result = (|| -> Result<Inode, FsError> {
            let mut current = self.ops.getattr(ino)?;
            if let Some(perm) = mode {
                current = self.ops.chmod(ino, perm)?;
            }
            if uid.is_some() || gid.is_some() {
                let new_uid = uid.unwrap_or(current.uid);
                let new_gid = gid.unwrap_or(current.gid);
                current = self.ops.chown(ino, new_uid, new_gid, caller_uid)?;
            }
            if let Some(size) = size {
                current = self.ops.truncate(ino, size)?;
            }
            if atime.is_some() || mtime.is_some() {
                current = self.ops.utimens(
                    ino,
                    atime.map(resolve_time),
                    mtime.map(resolve_time),
                )?;
            }
            Ok(current)
        })();
        match result {
            Ok(inode) => reply.attr(&TTL, &to_file_attr(&inode)),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.mkdir(parent, name, mode, req.uid(), req.gid()) {
            Ok(inode) => reply.entry(&TTL, &to_file_attr(&inode), 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.create(parent, name, mode, req.uid(), req.gid(), flags) {
            Ok(created) => reply.created(&TTL, &to_file_attr(&created.attr), 0, created.fh, flags as u32),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.ops.open(ino, flags) {
            Ok(fh) => reply.opened(fh, flags as u32),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.ops.read(fh, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.ops.write(fh, offset as u64, data) {
            Ok(written) => reply.written(written),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.ops.release(fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.unlink(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(name) = name_str(name) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.rmdir(parent, name) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(name), Some(newname)) = (name_str(name), name_str(newname)) else {
            reply.error(libc::EINVAL);
            return;
        };
        match self.ops.rename(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, flags: i32, reply: ReplyOpen) {
        reply.opened(0, flags as u32);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.ops.readdir(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        for (i, (name, inode_id, kind)) in entries.into_iter().enumerate().skip(offset as usize) {
            let file_type = match kind {
                FileKind::Directory => FileType::Directory,
                FileKind::RegularFile => FileType::RegularFile,
            };
            let full = reply.add(inode_id, (i + 1) as i64, file_type, name);
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let s = self.ops.statfs();
        reply.statfs(
            s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
        );
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.ops.getattr(ino) {
            Ok(_) => reply.ok(),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        debug!("filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        warn!("filesystem unmounted");
    }
}
