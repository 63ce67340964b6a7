//! Request dispatch.
//!
//! The transport decodes a kernel request, picks the target instance by id,
//! and calls the matching [`Dispatcher`] method. The dispatcher resolves the
//! instance, checks the request shape, invokes the capability, and completes
//! the request through the supplied callback exactly once.
//!
//! Shape checks stay on the bridge side so implementations never see them:
//! entry names must be non-empty single path components without NUL and at
//! most [`NAME_MAX`] bytes, and zero-sized xattr requests are size probes.
//! Filesystem semantics (does the parent exist, is it a directory) belong to
//! the implementation.
//!
//! A request against an unregistered instance id is a transport bug and
//! panics.

use crate::registry::{self, InstanceGuard, InstanceId, Registry};
use crate::reply::Reply;
use fsbridge_core::{
    ConnInfo, DirEntryWriter, FileInfo, FsResult, InoAttr, InodeId, SetAttrMask, Status,
};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::{debug, trace};

/// Longest accepted entry name, in bytes.
pub const NAME_MAX: usize = 255;

/// Largest extended attribute value the kernel will transfer.
pub const XATTR_SIZE_MAX: u32 = 65536;

/// Rejects names that are not a single valid path component.
pub fn check_name(name: &OsStr) -> FsResult<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.iter().any(|&b| b == b'/' || b == 0) {
        return Err(Status::InvalidArgument);
    }
    if bytes.len() > NAME_MAX {
        return Err(Status::NameTooLong);
    }
    Ok(())
}

fn check_xattr_name(name: &OsStr) -> FsResult<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(Status::InvalidArgument);
    }
    Ok(())
}

fn reply_len(len: usize) -> FsResult<u32> {
    u32::try_from(len).map_err(|_| Status::Range)
}

/// Routes requests to registered filesystem instances.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher<'r> {
    registry: &'r Registry,
}

impl Dispatcher<'static> {
    /// A dispatcher over the process-wide registry.
    pub fn global() -> Self {
        Self::new(registry::global())
    }
}

impl<'r> Dispatcher<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    #[track_caller]
    fn instance(&self, id: InstanceId) -> InstanceGuard {
        match self.registry.acquire(id) {
            Some(guard) => guard,
            None => panic!("request dispatched to unregistered filesystem instance {id}"),
        }
    }

    /// Completes a request. The instance guard is still held by the caller,
    /// so deregistration waits for the callback to return.
    fn finish(op: &'static str, id: InstanceId, result: FsResult<Reply>, reply: impl FnOnce(Reply)) {
        let out = result.unwrap_or_else(Reply::Error);
        if let Reply::Error(status) = &out {
            debug!(instance = %id, op, error = %status, "request failed");
        }
        reply(out);
    }

    pub fn init(&self, id: InstanceId, mut conn: ConnInfo, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, proto_major = conn.proto_major, proto_minor = conn.proto_minor, "init");
        fs.init(&mut conn);
        Self::finish("init", id, Ok(Reply::Init(conn)), reply);
    }

    pub fn destroy(&self, id: InstanceId, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, "destroy");
        fs.destroy();
        Self::finish("destroy", id, Ok(Reply::Empty), reply);
    }

    pub fn lookup(
        &self,
        id: InstanceId,
        parent: InodeId,
        name: &OsStr,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, "lookup");
        let result = check_name(name).and_then(|()| fs.lookup(parent, name).map(Reply::Entry));
        Self::finish("lookup", id, result, reply);
    }

    /// Drops `nlookup` references. Never fails; the callback receives
    /// [`Reply::None`].
    pub fn forget(&self, id: InstanceId, ino: InodeId, nlookup: u64, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, nlookup, "forget");
        fs.forget(ino, nlookup);
        reply(Reply::None);
    }

    pub fn batch_forget(
        &self,
        id: InstanceId,
        nodes: &[(InodeId, u64)],
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, count = nodes.len(), "batch_forget");
        for &(ino, nlookup) in nodes {
            fs.forget(ino, nlookup);
        }
        reply(Reply::None);
    }

    pub fn getattr(
        &self,
        id: InstanceId,
        ino: InodeId,
        fi: Option<FileInfo>,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, "getattr");
        let result = fs.getattr(ino, fi.as_ref()).map(Reply::Attr);
        Self::finish("getattr", id, result, reply);
    }

    pub fn setattr(
        &self,
        id: InstanceId,
        ino: InodeId,
        attr: &InoAttr,
        mask: SetAttrMask,
        fi: Option<FileInfo>,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, ?mask, "setattr");
        let result = fs.setattr(ino, attr, mask, fi.as_ref()).map(Reply::Attr);
        Self::finish("setattr", id, result, reply);
    }

    pub fn readlink(&self, id: InstanceId, ino: InodeId, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, "readlink");
        let result = fs.readlink(ino).map(Reply::ReadLink);
        Self::finish("readlink", id, result, reply);
    }

    /// Lists entries after `offset`, packing at most `size` bytes.
    pub fn readdir(
        &self,
        id: InstanceId,
        ino: InodeId,
        fi: FileInfo,
        offset: i64,
        size: u32,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, offset, size, "readdir");
        let mut writer = DirEntryWriter::new(size as usize);
        let result = fs
            .readdir(ino, &fi, offset, &mut writer)
            .map(|()| Reply::Directory(writer.into_entries()));
        Self::finish("readdir", id, result, reply);
    }

    pub fn mknod(
        &self,
        id: InstanceId,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        rdev: u32,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, mode, rdev, "mknod");
        let result =
            check_name(name).and_then(|()| fs.mknod(parent, name, mode, rdev).map(Reply::Entry));
        Self::finish("mknod", id, result, reply);
    }

    pub fn mkdir(
        &self,
        id: InstanceId,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, mode, "mkdir");
        let result = check_name(name).and_then(|()| fs.mkdir(parent, name, mode).map(Reply::Entry));
        Self::finish("mkdir", id, result, reply);
    }

    pub fn create(
        &self,
        id: InstanceId,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        mut fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, mode, flags = fi.flags, "create");
        let result = check_name(name).and_then(|()| {
            fs.create(parent, name, mode, &mut fi)
                .map(|entry| Reply::Create { entry, info: fi })
        });
        Self::finish("create", id, result, reply);
    }

    pub fn symlink(
        &self,
        id: InstanceId,
        target: &Path,
        parent: InodeId,
        name: &OsStr,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, ?target, "symlink");
        let result =
            check_name(name).and_then(|()| fs.symlink(target, parent, name).map(Reply::Entry));
        Self::finish("symlink", id, result, reply);
    }

    pub fn link(
        &self,
        id: InstanceId,
        ino: InodeId,
        new_parent: InodeId,
        new_name: &OsStr,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, new_parent, ?new_name, "link");
        let result = check_name(new_name)
            .and_then(|()| fs.link(ino, new_parent, new_name).map(Reply::Entry));
        Self::finish("link", id, result, reply);
    }

    pub fn open(&self, id: InstanceId, ino: InodeId, mut fi: FileInfo, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, flags = fi.flags, "open");
        let result = fs.open(ino, &mut fi).map(|()| Reply::Open(fi));
        Self::finish("open", id, result, reply);
    }

    pub fn opendir(
        &self,
        id: InstanceId,
        ino: InodeId,
        mut fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, flags = fi.flags, "opendir");
        let result = fs.opendir(ino, &mut fi).map(|()| Reply::Open(fi));
        Self::finish("opendir", id, result, reply);
    }

    /// Reads up to `size` bytes. Data beyond `size` returned by the
    /// implementation is cut off.
    pub fn read(
        &self,
        id: InstanceId,
        ino: InodeId,
        size: u32,
        offset: i64,
        fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, offset, size, "read");
        let result = fs.read(ino, size, offset, &fi).map(|mut data| {
            data.truncate(size as usize);
            Reply::Data(data)
        });
        Self::finish("read", id, result, reply);
    }

    pub fn write(
        &self,
        id: InstanceId,
        ino: InodeId,
        data: &[u8],
        offset: i64,
        fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, offset, len = data.len(), "write");
        let result = fs.write(ino, data, offset, &fi).and_then(|written| {
            // Claiming more than was offered is an implementation bug.
            if written > data.len() {
                return Err(Status::Io);
            }
            reply_len(written).map(Reply::Written)
        });
        Self::finish("write", id, result, reply);
    }

    pub fn flush(&self, id: InstanceId, ino: InodeId, fi: FileInfo, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, "flush");
        let result = fs.flush(ino, &fi).map(|()| Reply::Empty);
        Self::finish("flush", id, result, reply);
    }

    pub fn release(&self, id: InstanceId, ino: InodeId, fi: FileInfo, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, "release");
        let result = fs.release(ino, &fi).map(|()| Reply::Empty);
        Self::finish("release", id, result, reply);
    }

    pub fn fsync(
        &self,
        id: InstanceId,
        ino: InodeId,
        data_only: bool,
        fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, data_only, "fsync");
        let result = fs.fsync(ino, data_only, &fi).map(|()| Reply::Empty);
        Self::finish("fsync", id, result, reply);
    }

    pub fn releasedir(
        &self,
        id: InstanceId,
        ino: InodeId,
        fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, "releasedir");
        let result = fs.releasedir(ino, &fi).map(|()| Reply::Empty);
        Self::finish("releasedir", id, result, reply);
    }

    pub fn fsyncdir(
        &self,
        id: InstanceId,
        ino: InodeId,
        data_only: bool,
        fi: FileInfo,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, fh = fi.handle, data_only, "fsyncdir");
        let result = fs.fsyncdir(ino, data_only, &fi).map(|()| Reply::Empty);
        Self::finish("fsyncdir", id, result, reply);
    }

    pub fn rename(
        &self,
        id: InstanceId,
        parent: InodeId,
        name: &OsStr,
        new_parent: InodeId,
        new_name: &OsStr,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, new_parent, ?new_name, "rename");
        let result = check_name(name)
            .and_then(|()| check_name(new_name))
            .and_then(|()| fs.rename(parent, name, new_parent, new_name))
            .map(|()| Reply::Empty);
        Self::finish("rename", id, result, reply);
    }

    pub fn unlink(&self, id: InstanceId, parent: InodeId, name: &OsStr, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, "unlink");
        let result = check_name(name)
            .and_then(|()| fs.unlink(parent, name))
            .map(|()| Reply::Empty);
        Self::finish("unlink", id, result, reply);
    }

    pub fn rmdir(&self, id: InstanceId, parent: InodeId, name: &OsStr, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, parent, ?name, "rmdir");
        let result = check_name(name)
            .and_then(|()| fs.rmdir(parent, name))
            .map(|()| Reply::Empty);
        Self::finish("rmdir", id, result, reply);
    }

    pub fn access(&self, id: InstanceId, ino: InodeId, mask: i32, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, mask, "access");
        let result = fs.access(ino, mask).map(|()| Reply::Empty);
        Self::finish("access", id, result, reply);
    }

    pub fn statfs(&self, id: InstanceId, ino: InodeId, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, "statfs");
        let result = fs.statfs(ino).map(Reply::StatFs);
        Self::finish("statfs", id, result, reply);
    }

    /// Lists xattr names. With `size == 0` the reply is the byte length of
    /// the NUL-separated name list; a nonzero `size` too small for it is
    /// [`Status::Range`].
    pub fn listxattr(&self, id: InstanceId, ino: InodeId, size: u32, reply: impl FnOnce(Reply)) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, size, "listxattr");
        let result = fs.listxattr(ino).and_then(|names| {
            let total: usize = names.iter().map(|name| name.len() + 1).sum();
            if size == 0 {
                reply_len(total).map(Reply::XAttrSize)
            } else if total > size as usize {
                Err(Status::Range)
            } else {
                Ok(Reply::XAttrNames(names))
            }
        });
        Self::finish("listxattr", id, result, reply);
    }

    /// Reads an xattr value. With `size == 0` the reply is the value length.
    /// Buffers are capped at [`XATTR_SIZE_MAX`]; a larger value is
    /// [`Status::Range`] however big the request.
    pub fn getxattr(
        &self,
        id: InstanceId,
        ino: InodeId,
        name: &OsStr,
        size: u32,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, ?name, size, "getxattr");
        let result = check_xattr_name(name).and_then(|()| {
            if size == 0 {
                return fs
                    .getxattr_size(ino, name)
                    .and_then(reply_len)
                    .map(Reply::XAttrSize);
            }
            let mut buf = vec![0u8; size.min(XATTR_SIZE_MAX) as usize];
            let copied = fs.getxattr(ino, name, &mut buf)?;
            if copied > buf.len() {
                return Err(Status::Range);
            }
            buf.truncate(copied);
            Ok(Reply::Data(buf))
        });
        Self::finish("getxattr", id, result, reply);
    }

    pub fn setxattr(
        &self,
        id: InstanceId,
        ino: InodeId,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, ?name, len = value.len(), flags, "setxattr");
        let result = check_xattr_name(name)
            .and_then(|()| fs.setxattr(ino, name, value, flags))
            .map(|()| Reply::Empty);
        Self::finish("setxattr", id, result, reply);
    }

    pub fn removexattr(
        &self,
        id: InstanceId,
        ino: InodeId,
        name: &OsStr,
        reply: impl FnOnce(Reply),
    ) {
        let fs = self.instance(id);
        trace!(instance = %id, inode = ino, ?name, "removexattr");
        let result = check_xattr_name(name)
            .and_then(|()| fs.removexattr(ino, name))
            .map(|()| Reply::Empty);
        Self::finish("removexattr", id, result, reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsbridge_core::{DefaultFileSystem, Entry, MemFs, ROOT_INODE};
    use std::cell::Cell;
    use std::ffi::OsString;
    use std::sync::Arc;

    fn capture(f: impl FnOnce(&mut dyn FnMut(Reply))) -> Reply {
        let mut out = None;
        f(&mut |reply| {
            assert!(out.is_none(), "callback invoked twice");
            out = Some(reply);
        });
        out.expect("callback not invoked")
    }

    #[test]
    fn test_check_name() {
        assert!(check_name(OsStr::new("file.txt")).is_ok());
        assert_eq!(check_name(OsStr::new("")), Err(Status::InvalidArgument));
        assert_eq!(check_name(OsStr::new("a/b")), Err(Status::InvalidArgument));
        assert_eq!(
            check_name(OsStr::from_bytes(b"a\0b")),
            Err(Status::InvalidArgument)
        );

        let max = "x".repeat(NAME_MAX);
        assert!(check_name(OsStr::new(&max)).is_ok());
        let long = "x".repeat(NAME_MAX + 1);
        assert_eq!(check_name(OsStr::new(&long)), Err(Status::NameTooLong));
    }

    #[test]
    fn test_callback_invoked_exactly_once() {
        let registry = Registry::new();
        let id = registry.register(DefaultFileSystem);
        let dispatcher = Dispatcher::new(&registry);

        let calls = Cell::new(0);
        dispatcher.statfs(id, ROOT_INODE, |_| calls.set(calls.get() + 1));
        dispatcher.forget(id, ROOT_INODE, 1, |_| calls.set(calls.get() + 1));
        dispatcher.lookup(id, ROOT_INODE, OsStr::new(""), |_| {
            calls.set(calls.get() + 1);
        });
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_invalid_name_never_reaches_filesystem() {
        struct Tripwire;
        impl fsbridge_core::FileSystem for Tripwire {
            fn lookup(&self, _parent: InodeId, _name: &OsStr) -> FsResult<Entry> {
                panic!("lookup reached the filesystem");
            }
        }

        let registry = Registry::new();
        let id = registry.register(Tripwire);
        let dispatcher = Dispatcher::new(&registry);
        let reply = capture(|cb| dispatcher.lookup(id, ROOT_INODE, OsStr::new("a/b"), cb));
        assert_eq!(reply, Reply::Error(Status::InvalidArgument));
    }

    #[test]
    fn test_forget_replies_none() {
        let registry = Registry::new();
        let id = registry.register(DefaultFileSystem);
        let dispatcher = Dispatcher::new(&registry);

        assert_eq!(capture(|cb| dispatcher.forget(id, 999, 5, cb)), Reply::None);
        assert_eq!(
            capture(|cb| dispatcher.batch_forget(id, &[(1, 1), (2, 3)], cb)),
            Reply::None
        );
    }

    #[test]
    fn test_init_returns_connection() {
        let registry = Registry::new();
        let id = registry.register(DefaultFileSystem);
        let dispatcher = Dispatcher::new(&registry);

        let conn = ConnInfo {
            proto_major: 7,
            proto_minor: 31,
            ..ConnInfo::default()
        };
        assert_eq!(capture(|cb| dispatcher.init(id, conn, cb)), Reply::Init(conn));
        assert_eq!(capture(|cb| dispatcher.destroy(id, cb)), Reply::Empty);
    }

    #[test]
    fn test_listxattr_size_protocol() {
        let registry = Registry::new();
        let id = registry.register(MemFs::new());
        let dispatcher = Dispatcher::new(&registry);
        let fs = registry.get(id).unwrap();
        fs.setxattr(ROOT_INODE, OsStr::new("user.a"), b"1", 0).unwrap();
        fs.setxattr(ROOT_INODE, OsStr::new("user.bc"), b"22", 0).unwrap();

        // "user.a\0user.bc\0"
        assert_eq!(
            capture(|cb| dispatcher.listxattr(id, ROOT_INODE, 0, cb)),
            Reply::XAttrSize(15)
        );
        assert_eq!(
            capture(|cb| dispatcher.listxattr(id, ROOT_INODE, 14, cb)),
            Reply::Error(Status::Range)
        );
        match capture(|cb| dispatcher.listxattr(id, ROOT_INODE, 15, cb)) {
            Reply::XAttrNames(mut names) => {
                names.sort();
                assert_eq!(names, vec![OsString::from("user.a"), OsString::from("user.bc")]);
            }
            other => panic!("unexpected reply {other:?}"),
        }
    }

    #[test]
    fn test_getxattr_size_protocol() {
        let registry = Registry::new();
        let id = registry.register(MemFs::new());
        let dispatcher = Dispatcher::new(&registry);
        registry
            .get(id)
            .unwrap()
            .setxattr(ROOT_INODE, OsStr::new("user.k"), b"value", 0)
            .unwrap();

        let name = OsStr::new("user.k");
        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, name, 0, cb)),
            Reply::XAttrSize(5)
        );
        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, name, 64, cb)),
            Reply::Data(b"value".to_vec())
        );
        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, name, 2, cb)),
            Reply::Error(Status::Range)
        );
        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, OsStr::new(""), 8, cb)),
            Reply::Error(Status::InvalidArgument)
        );
    }

    #[test]
    fn test_getxattr_buffer_is_capped() {
        struct Recorder(parking_lot::Mutex<Vec<usize>>);
        impl fsbridge_core::FileSystem for Recorder {
            fn getxattr(&self, _: InodeId, _: &OsStr, out: &mut [u8]) -> FsResult<usize> {
                self.0.lock().push(out.len());
                out[..2].copy_from_slice(b"ok");
                Ok(2)
            }
        }

        let registry = Registry::new();
        let fs = Arc::new(Recorder(parking_lot::Mutex::new(Vec::new())));
        let id = registry.register_shared(fs.clone());
        let dispatcher = Dispatcher::new(&registry);
        let name = OsStr::new("user.k");

        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, name, u32::MAX, cb)),
            Reply::Data(b"ok".to_vec())
        );
        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, name, 16, cb)),
            Reply::Data(b"ok".to_vec())
        );
        assert_eq!(*fs.0.lock(), vec![XATTR_SIZE_MAX as usize, 16]);
    }

    #[test]
    fn test_getxattr_oversized_value_is_range() {
        let registry = Registry::new();
        let id = registry.register(MemFs::new());
        let dispatcher = Dispatcher::new(&registry);
        let value = vec![1u8; XATTR_SIZE_MAX as usize + 1];
        registry
            .get(id)
            .unwrap()
            .setxattr(ROOT_INODE, OsStr::new("user.big"), &value, 0)
            .unwrap();

        assert_eq!(
            capture(|cb| dispatcher.getxattr(id, ROOT_INODE, OsStr::new("user.big"), u32::MAX, cb)),
            Reply::Error(Status::Range)
        );
    }

    #[test]
    fn test_write_overclaim_is_io_error() {
        struct Liar;
        impl fsbridge_core::FileSystem for Liar {
            fn write(&self, _: InodeId, data: &[u8], _: i64, _: &FileInfo) -> FsResult<usize> {
                Ok(data.len() + 1)
            }
        }

        let registry = Registry::new();
        let id = registry.register(Liar);
        let dispatcher = Dispatcher::new(&registry);
        let reply = capture(|cb| dispatcher.write(id, 2, b"abc", 0, FileInfo::default(), cb));
        assert_eq!(reply, Reply::Error(Status::Io));
    }

    #[test]
    fn test_read_truncates_to_requested_size() {
        struct Oversized;
        impl fsbridge_core::FileSystem for Oversized {
            fn read(&self, _: InodeId, _: u32, _: i64, _: &FileInfo) -> FsResult<Vec<u8>> {
                Ok(vec![7; 32])
            }
        }

        let registry = Registry::new();
        let id = registry.register(Oversized);
        let dispatcher = Dispatcher::new(&registry);
        let reply = capture(|cb| dispatcher.read(id, 2, 4, 0, FileInfo::default(), cb));
        assert_eq!(reply, Reply::Data(vec![7; 4]));
    }

    #[test]
    #[should_panic(expected = "unregistered filesystem instance")]
    fn test_unknown_instance_panics() {
        let registry = Registry::new();
        let dispatcher = Dispatcher::new(&registry);
        dispatcher.getattr(InstanceId::from_raw(42), ROOT_INODE, None, |_| {});
    }

    #[test]
    #[should_panic(expected = "unregistered filesystem instance")]
    fn test_deregistered_instance_panics() {
        let registry = Registry::new();
        let id = registry.register(DefaultFileSystem);
        registry.deregister(id);
        Dispatcher::new(&registry).statfs(id, ROOT_INODE, |_| {});
    }
}
