//! Pass-through filesystem for the fsbridge capability contract.
//!
//! [`LoopbackFs`] mirrors a host directory: lookups stat the host path and
//! record it under the host inode number, and file and directory handles are
//! host descriptors and listing snapshots.
//!
//! ```no_run
//! use fsbridge_core::{FileSystem, ROOT_INODE};
//! use fsbridge_loopback::LoopbackFs;
//! use std::ffi::OsStr;
//!
//! let fs = LoopbackFs::new("/srv/export")?;
//! let entry = fs.lookup(ROOT_INODE, OsStr::new("README"))?;
//! println!("README is inode {}", entry.ino);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod filesystem;
pub mod handles;
pub mod inode;

pub use error::LoopbackError;
pub use filesystem::LoopbackFs;
