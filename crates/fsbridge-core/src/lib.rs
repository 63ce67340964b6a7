//! Capability contract and data model for in-process FUSE filesystems.
//!
//! A filesystem plugs into the bridge by implementing [`FileSystem`]. Every
//! method has a default, so an implementation only writes what it supports;
//! anything else answers [`Status::NotSupported`].
//!
//! # Components
//!
//! - [`Status`] - POSIX-style failure kinds, convertible to and from errno
//! - [`FileSystem`] / [`DefaultFileSystem`] - the capability contract
//! - [`Entry`], [`InoAttr`], [`FileInfo`], [`StatVfs`], [`ConnInfo`] - data model
//! - [`DirEntryWriter`] - byte-budgeted sink for directory listings
//! - [`CacheTtl`] - kernel cache timeouts stamped on results
//! - [`MemFs`] - an in-memory implementation of the whole contract
//!
//! # Example
//!
//! ```
//! use fsbridge_core::{FileSystem, MemFs, Status, ROOT_INODE};
//! use std::ffi::OsStr;
//!
//! let fs = MemFs::new();
//! let created = fs.mknod(ROOT_INODE, OsStr::new("hello"), 0o644, 0).unwrap();
//! let found = fs.lookup(ROOT_INODE, OsStr::new("hello")).unwrap();
//! assert_eq!(created.ino, found.ino);
//!
//! assert_eq!(
//!     fs.lookup(ROOT_INODE, OsStr::new("missing")),
//!     Err(Status::NoEntry)
//! );
//! ```

pub mod config;
pub mod dirent;
pub mod error;
pub mod filesystem;
pub mod memfs;
pub mod types;

pub use config::{CacheTtl, DEFAULT_ATTR_TTL, DEFAULT_ENTRY_TTL};
pub use dirent::{dirent_size, DirEntry, DirEntryWriter};
pub use error::{FsResult, Status};
pub use filesystem::{DefaultFileSystem, FileSystem};
pub use memfs::MemFs;
pub use types::{
    ConnInfo, Entry, FileInfo, FileType, InoAttr, InodeId, SetAttrMask, StatVfs, ROOT_INODE,
};
