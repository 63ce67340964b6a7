//! In-memory filesystem.
//!
//! Implements the whole capability contract over a node table held in
//! memory. Useful as a test double for the dispatcher and as a worked example
//! of the lifetime rules every implementation follows:
//!
//! - Every resolving or creating operation adds one lookup reference.
//! - `forget` subtracts; counts from repeated lookups add up.
//! - A node is destroyed only when it is unlinked (`nlink == 0`), fully
//!   forgotten (`nlookup == 0`) and has no open handle. The root never is.
//!
//! Lookups share a read lock and bump the atomic lookup counter; everything
//! that changes the tree takes the write lock.

use crate::config::CacheTtl;
use crate::dirent::DirEntryWriter;
use crate::error::{FsResult, Status};
use crate::filesystem::FileSystem;
use crate::types::{
    Entry, FileInfo, FileType, InoAttr, InodeId, SetAttrMask, StatVfs, ROOT_INODE,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, trace};

/// Block size reported by statfs.
const BLOCK_SIZE: u32 = 4096;

/// Capacity reported by statfs, in blocks.
const TOTAL_BLOCKS: u64 = 1 << 20;

/// Inode capacity reported by statfs.
const TOTAL_FILES: u64 = 1 << 20;

const NAME_MAX: u32 = 255;

#[derive(Debug)]
enum Content {
    Directory {
        parent: InodeId,
        children: BTreeMap<OsString, InodeId>,
    },
    File(Vec<u8>),
    Symlink(PathBuf),
    /// Device, fifo or socket. Only its attributes are stored.
    Special,
}

#[derive(Debug)]
struct Node {
    attr: InoAttr,
    generation: u64,
    nlookup: AtomicU64,
    open_handles: u64,
    content: Content,
    xattrs: BTreeMap<OsString, Vec<u8>>,
}

impl Node {
    fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Subtracts `count`, clamping at zero. Returns the remaining count.
    fn dec_nlookup(&self, count: u64) -> u64 {
        let old = self
            .nlookup
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            })
            .unwrap_or(0);
        old.saturating_sub(count)
    }

    fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }

    fn is_dir(&self) -> bool {
        matches!(self.content, Content::Directory { .. })
    }

    fn children(&self) -> FsResult<&BTreeMap<OsString, InodeId>> {
        match &self.content {
            Content::Directory { children, .. } => Ok(children),
            _ => Err(Status::NotDirectory),
        }
    }

    fn children_mut(&mut self) -> FsResult<&mut BTreeMap<OsString, InodeId>> {
        match &mut self.content {
            Content::Directory { children, .. } => Ok(children),
            _ => Err(Status::NotDirectory),
        }
    }

    fn file(&self) -> FsResult<&[u8]> {
        match &self.content {
            Content::File(data) => Ok(data),
            Content::Directory { .. } => Err(Status::IsDirectory),
            _ => Err(Status::InvalidArgument),
        }
    }

    fn touch(&mut self, now: SystemTime) {
        self.attr.mtime = now;
        self.attr.ctime = now;
    }
}

#[derive(Debug)]
struct State {
    nodes: HashMap<InodeId, Node>,
    /// Open handle → inode it was opened on.
    handles: HashMap<u64, InodeId>,
    next_ino: InodeId,
    next_generation: u64,
    next_handle: u64,
}

impl State {
    fn node(&self, ino: InodeId) -> FsResult<&Node> {
        self.nodes.get(&ino).ok_or(Status::NoEntry)
    }

    fn node_mut(&mut self, ino: InodeId) -> FsResult<&mut Node> {
        self.nodes.get_mut(&ino).ok_or(Status::NoEntry)
    }

    fn child(&self, parent: InodeId, name: &OsStr) -> FsResult<InodeId> {
        self.node(parent)?
            .children()?
            .get(name)
            .copied()
            .ok_or(Status::NoEntry)
    }

    /// True if `ancestor` is `ino` or one of its parents.
    fn is_ancestor(&self, ancestor: InodeId, mut ino: InodeId) -> bool {
        loop {
            if ino == ancestor {
                return true;
            }
            match self.nodes.get(&ino).map(|n| &n.content) {
                Some(Content::Directory { parent, .. }) if *parent != ino => ino = *parent,
                _ => return false,
            }
        }
    }

    /// Creates a node under `parent` holding one lookup reference.
    fn insert_child(
        &mut self,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        owner: Option<(u32, u32)>,
        content: Content,
    ) -> FsResult<InodeId> {
        if self.node(parent)?.children()?.contains_key(name) {
            return Err(Status::Exists);
        }

        let ino = self.next_ino;
        self.next_ino += 1;
        let generation = self.next_generation;
        self.next_generation += 1;

        let now = SystemTime::now();
        let is_dir = matches!(content, Content::Directory { .. });
        let size = match &content {
            Content::Symlink(target) => target.as_os_str().len() as u64,
            _ => 0,
        };
        let attr = InoAttr {
            size,
            nlink: if is_dir { 2 } else { 1 },
            uid: owner.map(|(uid, _)| uid),
            gid: owner.map(|(_, gid)| gid),
            atime: now,
            mtime: now,
            ctime: now,
            ..InoAttr::new(ino, mode)
        };
        self.nodes.insert(
            ino,
            Node {
                attr,
                generation,
                nlookup: AtomicU64::new(1),
                open_handles: 0,
                content,
                xattrs: BTreeMap::new(),
            },
        );

        let parent_node = self.node_mut(parent)?;
        parent_node.children_mut()?.insert(name.to_os_string(), ino);
        parent_node.touch(now);
        if is_dir {
            parent_node.attr.nlink += 1;
        }
        Ok(ino)
    }

    /// Removes `name` from `parent` and drops the link it held.
    fn detach(&mut self, parent: InodeId, name: &OsStr) -> FsResult<InodeId> {
        let ino = self
            .node_mut(parent)?
            .children_mut()?
            .remove(name)
            .ok_or(Status::NoEntry)?;
        let now = SystemTime::now();

        let node = self.node_mut(ino)?;
        node.attr.ctime = now;
        let was_dir = node.is_dir();
        if was_dir {
            node.attr.nlink = 0;
        } else {
            node.attr.nlink = node.attr.nlink.saturating_sub(1);
        }

        let parent_node = self.node_mut(parent)?;
        parent_node.touch(now);
        if was_dir {
            parent_node.attr.nlink = parent_node.attr.nlink.saturating_sub(1);
        }

        self.reap(ino);
        Ok(ino)
    }

    /// Destroys `ino` once nothing refers to it any more.
    fn reap(&mut self, ino: InodeId) {
        if ino == ROOT_INODE {
            return;
        }
        let dead = self
            .nodes
            .get(&ino)
            .is_some_and(|n| n.attr.nlink == 0 && n.nlookup() == 0 && n.open_handles == 0);
        if dead {
            self.nodes.remove(&ino);
            debug!(inode = ino, "memfs: inode destroyed");
        }
    }

    fn open_handle(&mut self, ino: InodeId) -> FsResult<u64> {
        self.node_mut(ino)?.open_handles += 1;
        let handle = self.next_handle;
        self.next_handle += 1;
        self.handles.insert(handle, ino);
        Ok(handle)
    }

    fn check_handle(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        match self.handles.get(&fi.handle) {
            Some(&owner) if owner == ino => Ok(()),
            _ => Err(Status::BadHandle),
        }
    }

    fn close_handle(&mut self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.check_handle(ino, fi)?;
        self.handles.remove(&fi.handle);
        if let Some(node) = self.nodes.get_mut(&ino) {
            node.open_handles = node.open_handles.saturating_sub(1);
        }
        self.reap(ino);
        Ok(())
    }
}

/// A filesystem held entirely in memory.
#[derive(Debug)]
pub struct MemFs {
    ttl: CacheTtl,
    /// Ownership stamped on new nodes, if tracked.
    owner: Option<(u32, u32)>,
    state: RwLock<State>,
}

impl MemFs {
    /// Creates an empty filesystem containing only the root directory.
    pub fn new() -> Self {
        Self::with_ttl(CacheTtl::default())
    }

    pub fn with_ttl(ttl: CacheTtl) -> Self {
        let now = SystemTime::now();
        let root = Node {
            attr: InoAttr {
                nlink: 2,
                atime: now,
                mtime: now,
                ctime: now,
                ..InoAttr::new(ROOT_INODE, FileType::Directory.mode_bits() | 0o755)
            },
            generation: 0,
            nlookup: AtomicU64::new(1),
            open_handles: 0,
            content: Content::Directory {
                parent: ROOT_INODE,
                children: BTreeMap::new(),
            },
            xattrs: BTreeMap::new(),
        };
        Self {
            ttl,
            owner: None,
            state: RwLock::new(State {
                nodes: HashMap::from([(ROOT_INODE, root)]),
                handles: HashMap::new(),
                next_ino: ROOT_INODE + 1,
                next_generation: 1,
                next_handle: 1,
            }),
        }
    }

    /// Stamps `uid`/`gid` on every node created from now on, including the root.
    #[must_use]
    pub fn with_owner(self, uid: u32, gid: u32) -> Self {
        {
            let mut state = self.state.write();
            if let Some(root) = state.nodes.get_mut(&ROOT_INODE) {
                root.attr.uid = Some(uid);
                root.attr.gid = Some(gid);
            }
        }
        Self {
            owner: Some((uid, gid)),
            ..self
        }
    }

    /// Number of live inodes, root included.
    pub fn inode_count(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Outstanding lookup references on `ino`, if it is alive.
    pub fn lookup_count(&self, ino: InodeId) -> Option<u64> {
        self.state.read().nodes.get(&ino).map(Node::nlookup)
    }

    fn attr_of(&self, node: &Node) -> InoAttr {
        InoAttr {
            timeout: self.ttl.attr_ttl,
            ..node.attr.clone()
        }
    }

    fn entry_of(&self, node: &Node) -> Entry {
        Entry {
            ino: node.attr.ino,
            generation: node.generation,
            attr: self.attr_of(node),
            attr_timeout: self.ttl.attr_ttl,
            entry_timeout: self.ttl.entry_ttl,
        }
    }

    fn create_node(
        &self,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        content: Content,
    ) -> FsResult<Entry> {
        let mut state = self.state.write();
        let ino = state.insert_child(parent, name, mode, self.owner, content)?;
        let node = state.node(ino)?;
        Ok(self.entry_of(node))
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemFs {
    fn statfs(&self, _ino: InodeId) -> FsResult<StatVfs> {
        let state = self.state.read();
        let used: u64 = state
            .nodes
            .values()
            .map(|n| n.attr.size.div_ceil(u64::from(BLOCK_SIZE)))
            .sum();
        let free = TOTAL_BLOCKS.saturating_sub(used);
        Ok(StatVfs {
            block_size: BLOCK_SIZE,
            fragment_size: BLOCK_SIZE,
            blocks: TOTAL_BLOCKS,
            blocks_free: free,
            blocks_available: free,
            files: TOTAL_FILES,
            files_free: TOTAL_FILES.saturating_sub(state.nodes.len() as u64),
            name_max: NAME_MAX,
        })
    }

    fn lookup(&self, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        let state = self.state.read();
        let dir = state.node(parent)?;
        let ino = match (name.to_str(), &dir.content) {
            (Some("."), Content::Directory { .. }) => parent,
            (Some(".."), Content::Directory { parent: up, .. }) => *up,
            _ => state.child(parent, name)?,
        };
        let node = state.node(ino)?;
        let nlookup = node.inc_nlookup();
        trace!(parent, ?name, inode = ino, nlookup, "memfs: lookup");
        Ok(self.entry_of(node))
    }

    fn forget(&self, ino: InodeId, nlookup: u64) {
        let mut state = self.state.write();
        if let Some(node) = state.nodes.get(&ino) {
            let remaining = node.dec_nlookup(nlookup);
            trace!(inode = ino, remaining, "memfs: forget");
            if remaining == 0 {
                state.reap(ino);
            }
        }
    }

    fn getattr(&self, ino: InodeId, _fi: Option<&FileInfo>) -> FsResult<InoAttr> {
        let state = self.state.read();
        Ok(self.attr_of(state.node(ino)?))
    }

    fn setattr(
        &self,
        ino: InodeId,
        attr: &InoAttr,
        mask: SetAttrMask,
        _fi: Option<&FileInfo>,
    ) -> FsResult<InoAttr> {
        let mut state = self.state.write();
        let node = state.node_mut(ino)?;
        let now = SystemTime::now();

        if mask.contains(SetAttrMask::SIZE) {
            let len = usize::try_from(attr.size).map_err(|_| Status::FileTooLarge)?;
            match &mut node.content {
                Content::File(data) => data.resize(len, 0),
                Content::Directory { .. } => return Err(Status::IsDirectory),
                _ => return Err(Status::InvalidArgument),
            }
            node.attr.size = attr.size;
            node.attr.mtime = now;
        }
        if mask.contains(SetAttrMask::MODE) {
            node.attr.mode = (node.attr.mode & !0o7777) | (attr.mode & 0o7777);
        }
        if mask.contains(SetAttrMask::UID) {
            node.attr.uid = attr.uid;
        }
        if mask.contains(SetAttrMask::GID) {
            node.attr.gid = attr.gid;
        }
        if mask.contains(SetAttrMask::ATIME_NOW) {
            node.attr.atime = now;
        } else if mask.contains(SetAttrMask::ATIME) {
            node.attr.atime = attr.atime;
        }
        if mask.contains(SetAttrMask::MTIME_NOW) {
            node.attr.mtime = now;
        } else if mask.contains(SetAttrMask::MTIME) {
            node.attr.mtime = attr.mtime;
        }
        node.attr.ctime = if mask.contains(SetAttrMask::CTIME) {
            attr.ctime
        } else {
            now
        };

        Ok(self.attr_of(node))
    }

    fn readlink(&self, ino: InodeId) -> FsResult<PathBuf> {
        let state = self.state.read();
        match &state.node(ino)?.content {
            Content::Symlink(target) => Ok(target.clone()),
            _ => Err(Status::InvalidArgument),
        }
    }

    fn readdir(
        &self,
        ino: InodeId,
        fi: &FileInfo,
        offset: i64,
        writer: &mut DirEntryWriter,
    ) -> FsResult<()> {
        let state = self.state.read();
        state.check_handle(ino, fi)?;
        let Content::Directory { parent, children } = &state.node(ino)?.content else {
            return Err(Status::NotDirectory);
        };
        let skip = usize::try_from(offset).map_err(|_| Status::InvalidArgument)?;

        let dots = [
            (ino, OsStr::new("."), FileType::Directory),
            (*parent, OsStr::new(".."), FileType::Directory),
        ];
        let entries = dots.into_iter().chain(children.iter().map(|(name, &child)| {
            let kind = state
                .nodes
                .get(&child)
                .and_then(|n| n.attr.file_type())
                .unwrap_or(FileType::RegularFile);
            (child, name.as_os_str(), kind)
        }));

        for (index, (child, name, kind)) in entries.enumerate().skip(skip) {
            let next = i64::try_from(index + 1).unwrap_or(i64::MAX);
            if !writer.push(child, name, kind, next) {
                break;
            }
        }
        Ok(())
    }

    fn mknod(&self, parent: InodeId, name: &OsStr, mode: u32, _rdev: u32) -> FsResult<Entry> {
        let (mode, content) = match FileType::from_mode(mode) {
            None => (mode | FileType::RegularFile.mode_bits(), Content::File(Vec::new())),
            Some(FileType::RegularFile) => (mode, Content::File(Vec::new())),
            Some(FileType::Directory | FileType::Symlink) => return Err(Status::InvalidArgument),
            Some(_) => (mode, Content::Special),
        };
        self.create_node(parent, name, mode, content)
    }

    fn mkdir(&self, parent: InodeId, name: &OsStr, mode: u32) -> FsResult<Entry> {
        let mode = FileType::Directory.mode_bits() | (mode & 0o7777);
        self.create_node(
            parent,
            name,
            mode,
            Content::Directory {
                parent,
                children: BTreeMap::new(),
            },
        )
    }

    fn create(
        &self,
        parent: InodeId,
        name: &OsStr,
        mode: u32,
        fi: &mut FileInfo,
    ) -> FsResult<Entry> {
        let mode = FileType::RegularFile.mode_bits() | (mode & 0o7777);
        let mut state = self.state.write();
        let ino = state.insert_child(parent, name, mode, self.owner, Content::File(Vec::new()))?;
        fi.handle = state.open_handle(ino)?;
        Ok(self.entry_of(state.node(ino)?))
    }

    fn symlink(&self, target: &Path, parent: InodeId, name: &OsStr) -> FsResult<Entry> {
        let mode = FileType::Symlink.mode_bits() | 0o777;
        self.create_node(parent, name, mode, Content::Symlink(target.to_path_buf()))
    }

    fn link(&self, ino: InodeId, new_parent: InodeId, new_name: &OsStr) -> FsResult<Entry> {
        let mut state = self.state.write();
        let node = state.node(ino)?;
        if node.is_dir() {
            return Err(Status::Perm);
        }
        // Still referenced by the kernel, but no longer in the namespace.
        if node.attr.nlink == 0 {
            return Err(Status::NoEntry);
        }
        let siblings = state.node_mut(new_parent)?.children_mut()?;
        if siblings.contains_key(new_name) {
            return Err(Status::Exists);
        }
        siblings.insert(new_name.to_os_string(), ino);

        let now = SystemTime::now();
        state.node_mut(new_parent)?.touch(now);
        let node = state.node_mut(ino)?;
        node.attr.nlink += 1;
        node.attr.ctime = now;
        node.inc_nlookup();
        Ok(self.entry_of(node))
    }

    fn open(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        let mut state = self.state.write();
        let node = state.node_mut(ino)?;
        match &mut node.content {
            Content::File(data) => {
                if fi.is_writable() && fi.flags & libc::O_TRUNC != 0 {
                    data.clear();
                    node.attr.size = 0;
                    node.touch(SystemTime::now());
                }
            }
            Content::Directory { .. } => return Err(Status::IsDirectory),
            Content::Symlink(_) => return Err(Status::Loop),
            Content::Special => return Err(Status::OperationNotSupported),
        }
        fi.handle = state.open_handle(ino)?;
        Ok(())
    }

    fn opendir(&self, ino: InodeId, fi: &mut FileInfo) -> FsResult<()> {
        let mut state = self.state.write();
        if !state.node(ino)?.is_dir() {
            return Err(Status::NotDirectory);
        }
        fi.handle = state.open_handle(ino)?;
        Ok(())
    }

    fn read(&self, ino: InodeId, size: u32, offset: i64, fi: &FileInfo) -> FsResult<Vec<u8>> {
        let state = self.state.read();
        state.check_handle(ino, fi)?;
        let data = state.node(ino)?.file()?;
        let start = usize::try_from(offset)
            .map_err(|_| Status::InvalidArgument)?
            .min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn write(&self, ino: InodeId, data: &[u8], offset: i64, fi: &FileInfo) -> FsResult<usize> {
        let mut state = self.state.write();
        state.check_handle(ino, fi)?;
        let offset = usize::try_from(offset).map_err(|_| Status::InvalidArgument)?;
        let node = state.node_mut(ino)?;

        let new_len = match &mut node.content {
            Content::File(content) => {
                let start = if fi.flags & libc::O_APPEND != 0 {
                    content.len()
                } else {
                    offset
                };
                let end = start.checked_add(data.len()).ok_or(Status::FileTooLarge)?;
                if end > content.len() {
                    content.resize(end, 0);
                }
                content[start..end].copy_from_slice(data);
                content.len()
            }
            Content::Directory { .. } => return Err(Status::IsDirectory),
            _ => return Err(Status::InvalidArgument),
        };
        node.attr.size = new_len as u64;
        node.touch(SystemTime::now());
        Ok(data.len())
    }

    fn flush(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.state.read().check_handle(ino, fi)
    }

    fn release(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.state.write().close_handle(ino, fi)
    }

    fn fsync(&self, ino: InodeId, _data_only: bool, fi: &FileInfo) -> FsResult<()> {
        self.state.read().check_handle(ino, fi)
    }

    fn releasedir(&self, ino: InodeId, fi: &FileInfo) -> FsResult<()> {
        self.state.write().close_handle(ino, fi)
    }

    fn fsyncdir(&self, ino: InodeId, _data_only: bool, fi: &FileInfo) -> FsResult<()> {
        self.state.read().check_handle(ino, fi)
    }

    fn rename(
        &self,
        parent: InodeId,
        name: &OsStr,
        new_parent: InodeId,
        new_name: &OsStr,
    ) -> FsResult<()> {
        let mut state = self.state.write();
        let src = state.child(parent, name)?;
        let existing = state.node(new_parent)?.children()?.get(new_name).copied();
        let src_is_dir = state.node(src)?.is_dir();

        if src_is_dir && state.is_ancestor(src, new_parent) {
            return Err(Status::InvalidArgument);
        }

        if let Some(dst) = existing {
            if dst == src {
                return Ok(());
            }
            let dst_node = state.node(dst)?;
            let dst_empty = dst_node.children().map_or(true, BTreeMap::is_empty);
            match (src_is_dir, dst_node.is_dir()) {
                (true, true) if !dst_empty => return Err(Status::NotEmpty),
                (false, true) => return Err(Status::IsDirectory),
                (true, false) => return Err(Status::NotDirectory),
                _ => {}
            }
            state.detach(new_parent, new_name)?;
        }

        let now = SystemTime::now();
        state.node_mut(parent)?.children_mut()?.remove(name);
        state.node_mut(parent)?.touch(now);
        let target_dir = state.node_mut(new_parent)?;
        target_dir.children_mut()?.insert(new_name.to_os_string(), src);
        target_dir.touch(now);

        if src_is_dir && parent != new_parent {
            state.node_mut(parent)?.attr.nlink -= 1;
            state.node_mut(new_parent)?.attr.nlink += 1;
            if let Content::Directory { parent: up, .. } = &mut state.node_mut(src)?.content {
                *up = new_parent;
            }
        }
        state.node_mut(src)?.attr.ctime = now;
        Ok(())
    }

    fn unlink(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        let mut state = self.state.write();
        let ino = state.child(parent, name)?;
        if state.node(ino)?.is_dir() {
            return Err(Status::IsDirectory);
        }
        state.detach(parent, name).map(|_| ())
    }

    fn rmdir(&self, parent: InodeId, name: &OsStr) -> FsResult<()> {
        let mut state = self.state.write();
        let ino = state.child(parent, name)?;
        if !state.node(ino)?.children()?.is_empty() {
            return Err(Status::NotEmpty);
        }
        state.detach(parent, name).map(|_| ())
    }

    fn access(&self, ino: InodeId, _mask: i32) -> FsResult<()> {
        self.state.read().node(ino).map(|_| ())
    }

    fn listxattr(&self, ino: InodeId) -> FsResult<Vec<OsString>> {
        let state = self.state.read();
        Ok(state.node(ino)?.xattrs.keys().cloned().collect())
    }

    fn getxattr_size(&self, ino: InodeId, name: &OsStr) -> FsResult<usize> {
        let state = self.state.read();
        state
            .node(ino)?
            .xattrs
            .get(name)
            .map(Vec::len)
            .ok_or(Status::NoAttribute)
    }

    fn getxattr(&self, ino: InodeId, name: &OsStr, out: &mut [u8]) -> FsResult<usize> {
        let state = self.state.read();
        let value = state
            .node(ino)?
            .xattrs
            .get(name)
            .ok_or(Status::NoAttribute)?;
        let dest = out.get_mut(..value.len()).ok_or(Status::Range)?;
        dest.copy_from_slice(value);
        Ok(value.len())
    }

    fn setxattr(&self, ino: InodeId, name: &OsStr, value: &[u8], flags: i32) -> FsResult<()> {
        let mut state = self.state.write();
        let node = state.node_mut(ino)?;
        let exists = node.xattrs.contains_key(name);
        if flags & libc::XATTR_CREATE != 0 && exists {
            return Err(Status::Exists);
        }
        if flags & libc::XATTR_REPLACE != 0 && !exists {
            return Err(Status::NoAttribute);
        }
        node.xattrs.insert(name.to_os_string(), value.to_vec());
        node.attr.ctime = SystemTime::now();
        Ok(())
    }

    fn removexattr(&self, ino: InodeId, name: &OsStr) -> FsResult<()> {
        let mut state = self.state.write();
        let node = state.node_mut(ino)?;
        node.xattrs.remove(name).ok_or(Status::NoAttribute)?;
        node.attr.ctime = SystemTime::now();
        Ok(())
    }
}
