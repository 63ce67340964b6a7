//! Status model for filesystem operations.
//!
//! Every capability method returns either its domain result or exactly one
//! [`Status`]. The variants mirror POSIX errno semantics so that a reply layer
//! can hand [`Status::to_errno`] straight to the kernel.
//!
//! [`Status::NotSupported`] (`ENOSYS`) is what the default capability bodies
//! return. It is deliberately distinct from [`Status::NoEntry`] so a caller can
//! tell "this operation is unimplemented" apart from "this path does not exist".

use std::io;
use thiserror::Error;

/// POSIX-style failure of a filesystem operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Status {
    /// Operation not permitted (EPERM).
    #[error("operation not permitted")]
    Perm,
    /// No such file or directory (ENOENT).
    #[error("no such entry")]
    NoEntry,
    /// Input/output error (EIO).
    #[error("I/O error")]
    Io,
    /// Bad file handle (EBADF).
    #[error("bad file handle")]
    BadHandle,
    /// Resource temporarily unavailable (EAGAIN).
    #[error("resource temporarily unavailable")]
    Again,
    /// Permission denied (EACCES).
    #[error("permission denied")]
    AccessDenied,
    /// Device or resource busy (EBUSY).
    #[error("resource busy")]
    Busy,
    /// Entry already exists (EEXIST).
    #[error("entry exists")]
    Exists,
    /// Cross-device link (EXDEV).
    #[error("cross-device link")]
    CrossDevice,
    /// Not a directory (ENOTDIR).
    #[error("not a directory")]
    NotDirectory,
    /// Is a directory (EISDIR).
    #[error("is a directory")]
    IsDirectory,
    /// Invalid argument (EINVAL).
    #[error("invalid argument")]
    InvalidArgument,
    /// File too large (EFBIG).
    #[error("file too large")]
    FileTooLarge,
    /// No space left on device (ENOSPC).
    #[error("no space left")]
    NoSpace,
    /// Read-only filesystem (EROFS).
    #[error("read-only filesystem")]
    ReadOnly,
    /// Too many links (EMLINK).
    #[error("too many links")]
    TooManyLinks,
    /// Result does not fit the supplied buffer (ERANGE).
    #[error("result out of range")]
    Range,
    /// Name too long (ENAMETOOLONG).
    #[error("name too long")]
    NameTooLong,
    /// Operation not implemented (ENOSYS). The default-implementation marker.
    #[error("operation not supported")]
    NotSupported,
    /// Directory not empty (ENOTEMPTY).
    #[error("directory not empty")]
    NotEmpty,
    /// Too many levels of symbolic links (ELOOP).
    #[error("too many levels of symbolic links")]
    Loop,
    /// No such extended attribute (ENODATA, ENOATTR on macOS).
    #[error("no such attribute")]
    NoAttribute,
    /// The node exists but refuses this operation (ENOTSUP).
    #[error("operation not supported by this node")]
    OperationNotSupported,
    /// Operation timed out (ETIMEDOUT).
    #[error("operation timed out")]
    TimedOut,
}

#[cfg(target_os = "macos")]
const ENOATTR: i32 = libc::ENOATTR;
#[cfg(not(target_os = "macos"))]
const ENOATTR: i32 = libc::ENODATA;

impl Status {
    /// Returns the libc error code for this status.
    pub fn to_errno(self) -> i32 {
        match self {
            Status::Perm => libc::EPERM,
            Status::NoEntry => libc::ENOENT,
            Status::Io => libc::EIO,
            Status::BadHandle => libc::EBADF,
            Status::Again => libc::EAGAIN,
            Status::AccessDenied => libc::EACCES,
            Status::Busy => libc::EBUSY,
            Status::Exists => libc::EEXIST,
            Status::CrossDevice => libc::EXDEV,
            Status::NotDirectory => libc::ENOTDIR,
            Status::IsDirectory => libc::EISDIR,
            Status::InvalidArgument => libc::EINVAL,
            Status::FileTooLarge => libc::EFBIG,
            Status::NoSpace => libc::ENOSPC,
            Status::ReadOnly => libc::EROFS,
            Status::TooManyLinks => libc::EMLINK,
            Status::Range => libc::ERANGE,
            Status::NameTooLong => libc::ENAMETOOLONG,
            Status::NotSupported => libc::ENOSYS,
            Status::NotEmpty => libc::ENOTEMPTY,
            Status::Loop => libc::ELOOP,
            Status::NoAttribute => ENOATTR,
            Status::OperationNotSupported => libc::ENOTSUP,
            Status::TimedOut => libc::ETIMEDOUT,
        }
    }

    /// Maps a native error code onto the status model.
    ///
    /// Codes without a corresponding kind become [`Status::NotSupported`].
    pub fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EPERM => Status::Perm,
            libc::ENOENT => Status::NoEntry,
            libc::EIO => Status::Io,
            libc::EBADF => Status::BadHandle,
            libc::EAGAIN => Status::Again,
            libc::EACCES => Status::AccessDenied,
            libc::EBUSY => Status::Busy,
            libc::EEXIST => Status::Exists,
            libc::EXDEV => Status::CrossDevice,
            libc::ENOTDIR => Status::NotDirectory,
            libc::EISDIR => Status::IsDirectory,
            libc::EINVAL => Status::InvalidArgument,
            libc::EFBIG => Status::FileTooLarge,
            libc::ENOSPC => Status::NoSpace,
            libc::EROFS => Status::ReadOnly,
            libc::EMLINK => Status::TooManyLinks,
            libc::ERANGE => Status::Range,
            libc::ENAMETOOLONG => Status::NameTooLong,
            libc::ENOSYS => Status::NotSupported,
            libc::ENOTEMPTY => Status::NotEmpty,
            libc::ELOOP => Status::Loop,
            ENOATTR => Status::NoAttribute,
            libc::ENOTSUP => Status::OperationNotSupported,
            libc::ETIMEDOUT => Status::TimedOut,
            _ => Status::NotSupported,
        }
    }

    /// Returns true for the default "unimplemented" marker.
    pub fn is_not_supported(self) -> bool {
        self == Status::NotSupported
    }
}

/// Result type for capability operations.
pub type FsResult<T> = Result<T, Status>;

/// Native I/O errors are unwrapped to their OS code; anything without one
/// cannot be classified and becomes [`Status::NotSupported`].
impl From<io::Error> for Status {
    fn from(e: io::Error) -> Self {
        e.raw_os_error()
            .map_or(Status::NotSupported, Status::from_errno)
    }
}

impl From<nix::errno::Errno> for Status {
    fn from(e: nix::errno::Errno) -> Self {
        Status::from_errno(e as i32)
    }
}
