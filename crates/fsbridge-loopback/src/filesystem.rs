//! Pass-through filesystem over a host directory.

use crate::error::LoopbackError;
use crate::handles::{HandleKind, HandleTable};
use crate::inode::InodeTable;
use fsbridge_core::{
    CacheTtl, ConnInfo, DirEntry, DirEntryWriter, Entry, FileInfo, FileSystem, FileType, FsResult,
    InoAttr, InodeId, SetAttrMask, StatVfs, Status, ROOT_INODE,
};
use nix::sys::stat::Mode;
use nix::unistd::AccessFlags;
use std::ffi::{OsStr, OsString};
use std::fs::{self, DirBuilder, File, Metadata, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, DirEntryExt, FileExt, FileTypeExt, MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, trace, warn};

/// Host inode numbers are stable for a file's lifetime, so every entry is
/// reported with the same generation.
const GENERATION: u64 = 1;

fn timestamp(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = u32::try_from(nsecs).unwrap_or(0);
    match u64::try_from(secs) {
        Ok(secs) => UNIX_EPOCH + Duration::new(secs, nanos),
        Err(_) => {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + Duration::from_nanos(u64::from(nanos))
        }
    }
}

/// Converts host metadata into an attribute snapshot numbered `ino`.
fn attr_from(meta: &Metadata, ino: InodeId, ttl: Duration) -> InoAttr {
    InoAttr {
        ino,
        size: meta.size(),
        mode: meta.mode(),
        nlink: u32::try_from(meta.nlink()).unwrap_or(u32::MAX),
        uid: Some(meta.uid()),
        gid: Some(meta.gid()),
        atime: timestamp(meta.atime(), meta.atime_nsec()),
        mtime: timestamp(meta.mtime(), meta.mtime_nsec()),
        ctime: timestamp(meta.ctime(), meta.ctime_nsec()),
        timeout: ttl,
    }
}

fn kind_of(file_type: fs::FileType) -> FileType {
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else if file_type.is_fifo() {
        FileType::NamedPipe
    } else if file_type.is_char_device() {
        FileType::CharDevice
    } else if file_type.is_block_device() {
        FileType::BlockDevice
    } else if file_type.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

/// Open options for the access mode and status flags in `flags`.
/// Creation flags are stripped; `create` adds its own.
fn open_options(flags: i32) -> OpenOptions {
    let mut options = OpenOptions::new();
    match flags & libc::O_ACCMODE {
        libc::O_WRONLY => options.write(true),
        libc::O_RDWR => options.read(true).write(true),
        _ => options.read(true),
    };
    options.custom_flags(flags & !(libc::O_ACCMODE | libc::O_CREAT | libc::O_EXCL));
    options
}

#[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
fn permission_bits(mode: u32) -> Mode {
    Mode::from_bits_truncate((mode & 0o7777) as libc::mode_t)
}

/// Exposes a host directory tree through the capability contract.
///
/// Inode numbers are the host's, except that the mount root is always
/// [`ROOT_INODE`]. Entries are stat'ed with `lstat`, so symbolic links are
/// reported as links.
///
/// Attribute changes, hard links and extended attributes are not
/// implemented; they answer [`Status::NotSupported`].
#[derive(Debug)]
pub struct LoopbackFs {
    root: PathBuf,
    ttl: CacheTtl,
    inodes: InodeTable,
    handles: HandleTable,
}

impl LoopbackFs {
    /// Creates a filesystem rooted at `root` with default cache timeouts.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LoopbackError> {
        Self::with_ttl(root, CacheTtl::default())
    }

    pub fn with_ttl(root: impl Into<PathBuf>, ttl: CacheTtl) -> Result<Self, LoopbackError> {
        let root = root.into();
        let meta = fs::metadata(&root).map_err(|source| LoopbackError::Root {
            path: root.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(LoopbackError::NotADirectory(root));
        }

        debug!(root = %root.display(), native_ino = meta.ino(), "loopback: created");
        let root_attr = attr_from(&meta, ROOT_INODE, ttl.attr_ttl);
        Ok(Self {
            inodes: InodeTable::new(root.clone(), meta.ino(), root_attr),
            handles: HandleTable::new(),
            root,
            ttl,
        })
    }

    /// The host directory being exposed.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of inodes currently known.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Number of open file and directory handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Outstanding lookup count of `ino`, or `None` if it is not known.
    pub fn lookup_count(&self, ino: InodeId) -> Option<u64> {
        self.inodes.nlookup(ino)
    }

    /// Host path of the child `name` of directory `parent`.
    ///
    /// Uses the cached mode, so a non-directory parent fails before any
    /// path is built.
    fn child_path(&self, parent: InodeId, name: &OsStr) -> FsResult<PathBuf> {
        let (path, attr) = self.inodes.get(parent)?;
        if !attr.is_dir() {
            return Err(Status::NotDirectory);
        }
        Ok(path.join(name))
    }

    fn stat(&self, path: &Path) -> FsResult<(Metadata, InodeId)> {
        let meta = fs::symlink_metadata(path)?;
        let ino = self.inodes.bridge_ino(meta.ino());
        Ok((meta, ino))
    }

    /// Stats `path` and records it as looked up once.
    fn remember(&self, path: PathBuf) -> FsResult<Entry> {
        let (meta, ino) = self.stat(&path)?;
        Ok(self.remember_attr(path, attr_from(&meta, ino, self.ttl.attr_ttl)))
    }

    fn remember_attr(&self, path: PathBuf, attr: InoAttr) -> Entry {
        let ino = attr.ino;
        let nlookup = self.inodes.remember(path, attr.clone());
        trace!(inode = ino, nlookup, "loopback: remembered");
        Entry {
            ino,
            generation: GENERATION,
            attr,
            attr_timeout: self.ttl.attr_ttl,
            entry_timeout: self.ttl.entry_ttl,
        }
    }

    /// Registers `kind` as a new handle on `ino`, keeping the inode alive
    /// until the handle is released.
    fn open_handle(&self, ino: InodeId, kind: HandleKind) -> FsResult<u64> {
        self.inodes.opened(ino)?;
        Ok(self.handles.insert(ino, kind))
    }

    fn close_handle(&self, ino: InodeId, fh: u64) -> FsResult<()> {
        self.handles.remove(fh, ino)?;
        if self.inodes.closed(ino) {
            debug!(inode = ino, "loopback: inode evicted on release");
        }
        Ok(())
    }

    fn unsupported(op: &'static str, ino: InodeId) -> Status {
        warn!(op, inode = ino, "loopback: operation not implemented");
        Status::NotSupported
    }

    /// Snapshot of a directory, including `.` and `..`, with resume offsets.
    fn list_dir(&self, ino: InodeId, path: &Path) -> FsResult<Vec<DirEntry>> {
        let parent_ino = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            path.parent()
                .and_then(|p| fs::metadata(p).ok())
                .map_or(ino, |m| self.inodes.bridge_ino(m.ino()))
        };

        let mut children = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let kind = entry.file_type().map_or(FileType::RegularFile, kind_of);
            children.push((self.inodes.bridge_ino(entry.ino()), entry.file_name(), kind));
        }
        children.sort_by(|a, b| a.1.cmp(&b.1));

        let dots = [
            (ino, OsString::from("."), FileType::Directory),
            (parent_ino, OsString::from(".."), FileType::Directory),
        ];
        Ok(dots
            .into_iter()
            .chain(children)
            .enumerate()
            .map(|(index, (child, name, kind))| {
                let next = i64::try_from(index + 1).unwrap_or(i64::MAX);
                DirEntry::new(child, name, kind, next)
            })
            .collect())
    }
}

impl FileSystem for LoopbackFs {
    fn init(&self, conn: &mut ConnInfo) {
        info!(
            root = %self.root.display(),
            proto_major = conn.proto_major,
            proto_minor = conn.proto_minor,
            "loopback: init"
        );
    }

    fn destroy(&self) {
        info!(
            root = %self.root.display(),
            inodes = self.inodes.len(),
            handles = self.handles.len(),
            "loopback: destroy"
        );
    }

    #[allow(clippy::cast_possible_truncation, clippy::unnecessary_cast)]
    fn statfs(&self, _ino: InodeId) -> FsResult<StatVfs> {
        let st = nix::sys::statvfs::statvfs(&self.root)?;
        Ok(StatVfs {
            block_size: st.block_size() as u32,
            fragment_size: st.fragment_size() as u32,
            blocks: st.blocks() as u64,
            blocks_free: st.blocks_free() as u64,
            blocks_available: st.blocks_available() as u64,
            files: st.files() as u64,
            files_free: st.files_free() as u64,
            name_max: st.name_max() as u32,
        })
    }

    fn lookup(&self, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        trace!(parent, ?name, "loopback: lookup");
        // The mount root is its own parent; nothing above it is exposed.
        if parent == ROOT_INODE && name == ".." {
            let meta = fs::metadata(&self.root)?;
            let attr = attr_from(&meta, ROOT_INODE, self.ttl.attr_ttl);
            return Ok(self.remember_attr(self.root.clone(), attr));
        }
        let path = self.child_path(parent, name)?;
        self.remember(path)
    }

    fn forget(&self, ino: InodeId, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            debug!(inode = ino, "loopback: inode evicted");
        }
    }

    fn getattr(&self, ino: InodeId, fi: Option<&FileInfo>) -> FsResult<InoAttr> {
        // An open handle keeps answering after the path is unlinked.
        let meta = match fi.map(|fi| self.handles.file(fi.handle, ino)) {
            Some(Ok(file)) => file.metadata()?,
            _ if ino == ROOT_INODE => fs::metadata(&self.root)?,
            _ => fs::symlink_metadata(self.inodes.path(ino)?)?,
        };
        let attr = attr_from(&meta, ino, self.ttl.attr_ttl);
        self.inodes.refresh(ino, attr.clone());
        Ok(attr)
    }

    fn setattr(
        &self,
        ino: InodeId,
        _attr: &InoAttr,
        _mask: SetAttrMask,
        _fi: Option<&FileInfo>,
    ) -> FsResult<InoAttr> {
        Err(Self::unsupported("setattr", ino))
    }

    fn readlink(&self, ino: InodeId) -> FsResult<PathBuf> {
        Ok(fs::read_link(self.inodes.path(ino)?)?)
    }

    fn readdir(
        &self,
        ino: InodeId,
        fi: &FileInfo,
        offset: i64,
        writer: &mut DirEntryWriter,
    ) -> FsResult<()> {
        let entries = self.handles.dir(fi.handle, ino)?;
        let skip = usize::try_from(offset).map_err(|_| Status::InvalidArgument)?;
        for entry in entries.iter().skip(skip) {
            if !writer.add(entry.clone()) {
                break;
            }
        }
        Ok(())
    }

    fn mknod(&self, parent: InodeId, name: &OsStr, mode: u32, _rdev: u32) -> FsResult<Entry> {
        let path = self.child_path(parent, name)?;
        match FileType::from_mode(mode) {
            None | Some(FileType::RegularFile) => {
                OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(mode & 0o7777)
                    .open(&path)?;
            }
            Some(FileType::NamedPipe) => nix::unistd::mkfifo(&path, permission_bits(mode))?,
            Some(_) => return Err(Status::OperationNotSupported),
        }
        self.remember(path)
    }

    fn mkdir(&self, parent: InodeId, name: &OsStr, mode: u32) -> FsResult<Entry> {
        let path = self.child_path(parent, name)?;
        DirBuilder::new().mode(mode & 0o7777).create(&path)?;
        self.remember(path)
    }

    fn create(
        &self,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<Entry> {
        let path = self.child_path(parent, name)?;
        let mut options = open_options(fi.flags);
        options
            .custom_flags((fi.flags & !libc::O_ACCMODE) | libc::O_CREAT | libc::O_EXCL)
            .mode(mode & 0o7777);
        let file = options.open(&path)?;

        let entry = self.remember(path)?;
        fi.handle = self.open_handle(entry.ino, HandleKind::File(Arc::new(file)))?;
        Ok(entry)
    }

    fn symlink(&self, target: &Path, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        let path = self.child_path(parent, name)?;
        std::os::unix::fs::symlink(target, &path)?;
        self.remember(path)
    }

    fn link(&self, ino: InodeId, _new_parent: InodeId, _new_name: &OsStr) -> FsResult<Entry> {
        Err(Self::unsupported("link", ino))
    }

    fn open(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        let path = self.inodes.path(ino)?;
        let file: File = open_options(fi.flags).open(&path)?;
        fi.handle = self.open_handle(ino, HandleKind::File(Arc::new(file)))?;
        trace!(inode = ino, fh = fi.handle, "loopback: open");
        Ok(())
    }

    fn opendir(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        let (path, attr) = self.inodes.get(ino)?;
        if !attr.is_dir() {
            return Err(Status::NotDirectory);
        }
        let entries = self.list_dir(ino, &path)?;
        fi.handle = self.open_handle(ino, HandleKind::Dir(Arc::new(entries)))?;
        trace!(inode = ino, fh = fi.handle, "loopback: opendir");
        Ok(())
    }

    fn read(&self, ino: InodeId, size: u32, offset: i64, fi: &FileInfo) -> FsResult<Vec<u8>> {
        let file = self.handles.file(fi.handle, ino)?;
        let offset = u64::try_from(offset).map_err(|_| Status::InvalidArgument)?;

        let mut buf = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    fn write(&self, ino: InodeId, data: &[u8], offset: i64, fi: &FileInfo) -> FsResult<usize> {
        let file = self.handles.file(fi.handle, ino)?;
        let offset = u64::try_from(offset).map_err(|_| Status::InvalidArgument)?;
        Ok(file.write_at(data, offset)?)
    }

    fn flush(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.handles.file(fi.handle, ino).map(|_| ())
    }

    fn release(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.close_handle(ino, fi.handle)?;
        trace!(inode = ino, fh = fi.handle, "loopback: release");
        Ok(())
    }

    fn fsync(&self, ino: InodeId, data_only: bool, fi: &FileInfo) -> FsResult<()> {
        let file = self.handles.file(fi.handle, ino)?;
        if data_only {
            file.sync_data()?;
        } else {
            file.sync_all()?;
        }
        Ok(())
    }

    fn releasedir(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.close_handle(ino, fi.handle)?;
        trace!(inode = ino, fh = fi.handle, "loopback: releasedir");
        Ok(())
    }

    fn fsyncdir(&self, ino: InodeId, _data_only: bool, fi: &FileInfo) -> FsResult<()> {
        self.handles.dir(fi.handle, ino)?;
        File::open(self.inodes.path(ino)?)?.sync_all()?;
        Ok(())
    }

    fn rename(
        &self,
        parent: InodeId,
        name: &OsStr,
        new_parent: InodeId,
        new_name: &OsStr,
    ) -> FsResult<()> {
        let from = self.child_path(parent, name)?;
        let to = self.child_path(new_parent, new_name)?;
        let moved = fs::symlink_metadata(&from)?.ino();
        let replaced = self.inodes.ino_at(&to);
        fs::rename(&from, &to)?;
        // Renaming one hard link over another leaves both names in place.
        if let Some(replaced) = replaced.filter(|&r| r != self.inodes.bridge_ino(moved)) {
            self.inodes.detach(replaced);
        }
        self.inodes.rename_paths(&from, &to);
        debug!(from = %from.display(), to = %to.display(), "loopback: renamed");
        Ok(())
    }

    fn unlink(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        let path = self.child_path(parent, name)?;
        let removed = self.inodes.ino_at(&path);
        fs::remove_file(&path)?;
        if let Some(ino) = removed {
            self.inodes.detach(ino);
        }
        Ok(())
    }

    fn rmdir(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        let path = self.child_path(parent, name)?;
        let removed = self.inodes.ino_at(&path);
        fs::remove_dir(&path)?;
        if let Some(ino) = removed {
            self.inodes.detach(ino);
        }
        Ok(())
    }

    fn access(&self, ino: InodeId, mask: i32) -> FsResult<()> {
        let path = self.inodes.path(ino)?;
        nix::unistd::access(&path, AccessFlags::from_bits_truncate(mask))?;
        Ok(())
    }

    fn listxattr(&self, ino: InodeId) -> FsResult<Vec<OsString>> {
        Err(Self::unsupported("listxattr", ino))
    }

    fn getxattr_size(&self, ino: InodeId, _name: &OsStr) -> FsResult<usize> {
        Err(Self::unsupported("getxattr", ino))
    }

    fn getxattr(&self, ino: InodeId, _name: &OsStr, _out: &mut [u8]) -> FsResult<usize> {
        Err(Self::unsupported("getxattr", ino))
    }

    fn setxattr(&self, ino: InodeId, _name: &OsStr, _value: &[u8], _flags: i32) -> FsResult<()> {
        Err(Self::unsupported("setxattr", ino))
    }

    fn removexattr(&self, ino: InodeId, _name: &OsStr) -> FsResult<()> {
        Err(Self::unsupported("removexattr", ino))
    }
}
