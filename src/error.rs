//! Tagged error variants shared by the inode, directory and chunk layers.
//!
//! `ops` (C5) matches these to kernel errno values; nothing here knows about
//! FUSE or libc.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("permission denied")]
    PermissionDenied,
    #[error("bad file descriptor")]
    BadHandle,
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type FsResult<T> = Result<T, FsError>;

impl FsError {
    /// Maps a tagged error to the kernel errno the gateway should return,
    /// per the table in spec.md 4.5 / 7.
    pub fn to_errno(&self) -> libc::c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::PermissionDenied => libc::EPERM,
            FsError::BadHandle => libc::EBADF,
            FsError::Storage(_) => libc::EIO,
        }
    }
}
