//! Data model shared by every filesystem implementation.

use bitflags::bitflags;
use std::time::{Duration, SystemTime};

/// Identifier of a node within one filesystem instance.
pub type InodeId = u64;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: InodeId = 1;

/// Node type, derived from the `S_IFMT` bits of a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Named pipe (S_IFIFO).
    NamedPipe,
    /// Character device (S_IFCHR).
    CharDevice,
    /// Block device (S_IFBLK).
    BlockDevice,
    /// Directory (S_IFDIR).
    Directory,
    /// Regular file (S_IFREG).
    RegularFile,
    /// Symbolic link (S_IFLNK).
    Symlink,
    /// Unix domain socket (S_IFSOCK).
    Socket,
}

impl FileType {
    /// Classifies a raw mode. Returns `None` when the type bits are not set.
    #[allow(clippy::unnecessary_cast)]
    pub fn from_mode(mode: u32) -> Option<Self> {
        match mode & (libc::S_IFMT as u32) {
            m if m == libc::S_IFIFO as u32 => Some(FileType::NamedPipe),
            m if m == libc::S_IFCHR as u32 => Some(FileType::CharDevice),
            m if m == libc::S_IFBLK as u32 => Some(FileType::BlockDevice),
            m if m == libc::S_IFDIR as u32 => Some(FileType::Directory),
            m if m == libc::S_IFREG as u32 => Some(FileType::RegularFile),
            m if m == libc::S_IFLNK as u32 => Some(FileType::Symlink),
            m if m == libc::S_IFSOCK as u32 => Some(FileType::Socket),
            _ => None,
        }
    }

    /// Returns the `S_IFMT` bits for this type.
    #[allow(clippy::unnecessary_cast)]
    pub fn mode_bits(self) -> u32 {
        (match self {
            FileType::NamedPipe => libc::S_IFIFO,
            FileType::CharDevice => libc::S_IFCHR,
            FileType::BlockDevice => libc::S_IFBLK,
            FileType::Directory => libc::S_IFDIR,
            FileType::RegularFile => libc::S_IFREG,
            FileType::Symlink => libc::S_IFLNK,
            FileType::Socket => libc::S_IFSOCK,
        }) as u32
    }

    /// Returns the `d_type` value used in directory entries.
    pub fn dirent_type(self) -> u32 {
        self.mode_bits() >> 12
    }
}

/// Attribute snapshot of a node.
///
/// `uid`/`gid` are `None` when the implementation does not track ownership;
/// that is not the same as owned by root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InoAttr {
    pub ino: InodeId,
    pub size: u64,
    /// Permission and type bits.
    pub mode: u32,
    pub nlink: u32,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    /// How long the kernel may cache this snapshot.
    pub timeout: Duration,
}

impl InoAttr {
    /// Creates a snapshot with the given identity and mode and epoch timestamps.
    pub fn new(ino: InodeId, mode: u32) -> Self {
        Self {
            ino,
            size: 0,
            mode,
            nlink: 1,
            uid: None,
            gid: None,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            timeout: Duration::ZERO,
        }
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == Some(FileType::Directory)
    }

    /// Permission bits only.
    pub fn perm(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Result of a successful name resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub ino: InodeId,
    /// Distinguishes successive lives of a reused inode number.
    pub generation: u64,
    pub attr: InoAttr,
    /// Validity of `attr` in the kernel attribute cache.
    pub attr_timeout: Duration,
    /// Validity of the name→inode mapping in the kernel dentry cache.
    pub entry_timeout: Duration,
}

bitflags! {
    /// Which [`InoAttr`] fields a SetAttr request intends to change.
    ///
    /// Fields not named by the mask carry undefined values and must be ignored.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetAttrMask: u32 {
        const MODE = 1 << 0;
        const UID = 1 << 1;
        const GID = 1 << 2;
        const SIZE = 1 << 3;
        const ATIME = 1 << 4;
        const MTIME = 1 << 5;
        const ATIME_NOW = 1 << 7;
        const MTIME_NOW = 1 << 8;
        const CTIME = 1 << 10;
    }
}

/// Per-open-handle context.
///
/// `handle` is opaque to the bridge: whatever an implementation stores on
/// Open/OpenDir/Create comes back unchanged on every later call against it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileInfo {
    /// Open flags (`O_RDONLY`, `O_WRONLY`, ...).
    pub flags: i32,
    pub handle: u64,
    /// Bypass the page cache for this handle.
    pub direct_io: bool,
    /// Keep previously cached data on open.
    pub keep_cache: bool,
}

impl FileInfo {
    pub fn with_flags(flags: i32) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }

    /// Access mode part of the flags.
    pub fn access_mode(&self) -> i32 {
        self.flags & libc::O_ACCMODE
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.access_mode(), libc::O_WRONLY | libc::O_RDWR)
    }

    pub fn is_readable(&self) -> bool {
        matches!(self.access_mode(), libc::O_RDONLY | libc::O_RDWR)
    }
}

/// Filesystem-level statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatVfs {
    pub block_size: u32,
    pub fragment_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}

/// Capability and version negotiation data handed to `init`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnInfo {
    pub proto_major: u32,
    pub proto_minor: u32,
    pub max_write: u32,
    pub max_readahead: u32,
    /// Capabilities offered by the kernel.
    pub capable: u32,
    /// Capabilities requested by the filesystem; a subset of `capable`.
    pub want: u32,
}

impl ConnInfo {
    /// Requests a capability if the kernel offers it. Returns whether it was granted.
    pub fn request(&mut self, capability: u32) -> bool {
        if self.capable & capability == capability {
            self.want |= capability;
            true
        } else {
            false
        }
    }
}
