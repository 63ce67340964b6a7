//! Completion values handed to the transport.
//!
//! Every dispatched request completes with exactly one [`Reply`]. The
//! variant is what the transport serializes for the kernel; the kernel
//! request kind fixes which variants are possible.

use fsbridge_core::{ConnInfo, DirEntry, Entry, FileInfo, InoAttr, StatVfs, Status};
use std::ffi::OsString;
use std::path::PathBuf;

/// The outcome of one dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// No reply is sent (forget, batch forget).
    None,
    /// The request failed; the transport sends `-errno`.
    Error(Status),
    /// Success with no payload.
    Empty,
    /// Negotiated connection parameters.
    Init(ConnInfo),
    /// A directory entry (lookup, mknod, mkdir, symlink, link).
    Entry(Entry),
    /// A new entry together with its open handle.
    Create { entry: Entry, info: FileInfo },
    Attr(InoAttr),
    ReadLink(PathBuf),
    /// Open flags and handle (open, opendir).
    Open(FileInfo),
    /// Bytes read, or an extended attribute value.
    Data(Vec<u8>),
    /// Number of bytes written.
    Written(u32),
    Directory(Vec<DirEntry>),
    StatFs(StatVfs),
    /// Size answer to a zero-sized xattr probe.
    XAttrSize(u32),
    XAttrNames(Vec<OsString>),
}

impl Reply {
    /// The failure carried by this reply, if any.
    pub fn error(&self) -> Option<Status> {
        match self {
            Reply::Error(status) => Some(*status),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Negative errno for error replies, 0 otherwise.
    pub fn errno(&self) -> i32 {
        self.error().map_or(0, |status| -status.to_errno())
    }

    /// Short variant name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::None => "none",
            Reply::Error(_) => "error",
            Reply::Empty => "empty",
            Reply::Init(_) => "init",
            Reply::Entry(_) => "entry",
            Reply::Create { .. } => "create",
            Reply::Attr(_) => "attr",
            Reply::ReadLink(_) => "readlink",
            Reply::Open(_) => "open",
            Reply::Data(_) => "data",
            Reply::Written(_) => "written",
            Reply::Directory(_) => "directory",
            Reply::StatFs(_) => "statfs",
            Reply::XAttrSize(_) => "xattr_size",
            Reply::XAttrNames(_) => "xattr_names",
        }
    }
}

impl From<Status> for Reply {
    fn from(status: Status) -> Self {
        Reply::Error(status)
    }
}
