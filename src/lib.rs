//! A POSIX filesystem whose entire persistent state — inode metadata,
//! directory structure, and file content — lives in a single SQLite
//! database, exposed to the kernel over FUSE.

pub mod chunk;
pub mod dir;
pub mod error;
pub mod fuse_fs;
pub mod handle;
pub mod inode;
pub mod ops;
pub mod storage;

pub use error::{FsError, FsResult};
pub use fuse_fs::SqliteFs;
pub use ops::Filesystem;
pub use storage::Storage;
