//! The capability contract every filesystem implementation satisfies.
//!
//! [`FileSystem`] names every operation the bridge can route. Each method has
//! a default body, so an implementation only writes the operations it
//! supports:
//!
//! | Operation | Default |
//! |-----------|---------|
//! | init/destroy | no-op |
//! | forget | no-op (no reply is ever sent) |
//! | opendir | success, no handle stored |
//! | everything else | [`Status::NotSupported`] |
//!
//! OpenDir succeeds by default so that an implementation without directory
//! handle state can still be traversed read-only.
//!
//! All methods take `&self`. Requests run in parallel, including against
//! different inodes of one instance, so implementations synchronize their own
//! state.

use crate::dirent::DirEntryWriter;
use crate::error::{FsResult, Status};
use crate::types::{ConnInfo, Entry, FileInfo, InoAttr, InodeId, SetAttrMask, StatVfs};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Filesystem operations addressed by inode.
///
/// Every inode returned from `lookup`, `mknod`, `mkdir`, `symlink`, `link`
/// or `create` carries one lookup reference. It must stay valid until
/// `forget` calls for that inode add up to the number of references handed
/// out, and until every handle opened on it has been released.
#[allow(unused_variables)]
pub trait FileSystem: Send + Sync + 'static {
    /// Called once before any other method. May adjust `conn.want`.
    fn init(&self, conn: &mut ConnInfo) {}

    /// Called on filesystem exit.
    fn destroy(&self) {}

    /// Filesystem statistics.
    fn statfs(&self, ino: InodeId) -> FsResult<StatVfs> {
        Err(Status::NotSupported)
    }

    /// Resolves `name` inside directory `parent`, adding one lookup reference.
    fn lookup(&self, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    /// Drops `nlookup` lookup references. Counts from repeated lookups add up;
    /// state may only be discarded once all of them are consumed.
    ///
    /// There is no reply, so there is nothing to fail.
    fn forget(&self, ino: InodeId, nlookup: u64) {}

    /// Attributes of `ino`. `fi` is present when the request came through an
    /// open handle.
    fn getattr(&self, ino: InodeId, fi: Option<&FileInfo>) -> FsResult<InoAttr> {
        Err(Status::NotSupported)
    }

    /// Changes the attributes named by `mask` and returns the resulting snapshot.
    /// Fields of `attr` outside the mask are garbage.
    fn setattr(
        &self,
        ino: InodeId,
        attr: &InoAttr,
        mask: SetAttrMask,
        fi: Option<&FileInfo>,
    ) -> FsResult<InoAttr> {
        Err(Status::NotSupported)
    }

    /// Target of a symbolic link.
    fn readlink(&self, ino: InodeId) -> FsResult<PathBuf> {
        Err(Status::NotSupported)
    }

    /// Fills `writer` with entries following `offset`, stopping at the first
    /// entry the writer refuses.
    fn readdir(
        &self,
        ino: InodeId,
        fi: &FileInfo,
        offset: i64,
        writer: &mut DirEntryWriter,
    ) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Creates a file node (regular file, device, fifo or socket).
    fn mknod(&self, parent: InodeId, name: &OsStr, mode: u32, rdev: u32) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    fn mkdir(&self, parent: InodeId, name: &OsStr, mode: u32) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    /// Creates and opens a regular file. A handle stored in `fi` is returned
    /// on every later operation against it.
    fn create(
        &self,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    /// Creates a symbolic link `name` in `parent` pointing at `target`.
    fn symlink(&self, target: &Path, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    /// Creates a hard link to `ino` named `new_name` in `new_parent`.
    fn link(&self, ino: InodeId, new_parent: InodeId, new_name: &OsStr) -> FsResult<Entry> {
        Err(Status::NotSupported)
    }

    /// Opens a file. Flags are in `fi.flags`; a handle may be stored in `fi.handle`.
    fn open(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Opens a directory. Succeeds without storing a handle unless overridden.
    fn opendir(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        Ok(())
    }

    /// Reads up to `size` bytes at `offset`. Short reads mean end of file.
    fn read(&self, ino: InodeId, size: u32, offset: i64, fi: &FileInfo) -> FsResult<Vec<u8>> {
        Err(Status::NotSupported)
    }

    /// Writes `data` at `offset`, returning the number of bytes written.
    fn write(&self, ino: InodeId, data: &[u8], offset: i64, fi: &FileInfo) -> FsResult<usize> {
        Err(Status::NotSupported)
    }

    /// Called on every close() of a descriptor; may run several times per open.
    fn flush(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Drops an open handle. Called exactly once per successful open.
    fn release(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Synchronizes file contents; metadata too unless `data_only`.
    fn fsync(&self, ino: InodeId, data_only: bool, fi: &FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Drops a directory handle. Called exactly once per successful opendir.
    fn releasedir(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    fn fsyncdir(&self, ino: InodeId, data_only: bool, fi: &FileInfo) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    fn rename(
        &self,
        parent: InodeId,
        name: &OsStr,
        new_parent: InodeId,
        new_name: &OsStr,
    ) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    fn unlink(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    fn rmdir(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Checks access permissions for `mask` (`R_OK`, `W_OK`, `X_OK`, `F_OK`).
    fn access(&self, ino: InodeId, mask: i32) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    /// Names of the extended attributes of `ino`.
    fn listxattr(&self, ino: InodeId) -> FsResult<Vec<OsString>> {
        Err(Status::NotSupported)
    }

    /// Size of the value of extended attribute `name`.
    fn getxattr_size(&self, ino: InodeId, name: &OsStr) -> FsResult<usize> {
        Err(Status::NotSupported)
    }

    /// Copies the value of `name` into `out`, returning the bytes copied.
    /// A value larger than `out` is [`Status::Range`].
    fn getxattr(&self, ino: InodeId, name: &OsStr, out: &mut [u8]) -> FsResult<usize> {
        Err(Status::NotSupported)
    }

    /// Sets an extended attribute. `flags` may hold `XATTR_CREATE` or `XATTR_REPLACE`.
    fn setxattr(&self, ino: InodeId, name: &OsStr, value: &[u8], flags: i32) -> FsResult<()> {
        Err(Status::NotSupported)
    }

    fn removexattr(&self, ino: InodeId, name: &OsStr) -> FsResult<()> {
        Err(Status::NotSupported)
    }
}

/// A filesystem that implements nothing.
///
/// Every operation takes its default. Implementations that prefer explicit
/// delegation over the trait's default bodies can hold one of these and
/// forward the calls they do not handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFileSystem;

impl FileSystem for DefaultFileSystem {}
