//! Construction errors.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to set up a [`LoopbackFs`](crate::LoopbackFs).
///
/// Once constructed, the filesystem reports every failure as a
/// [`Status`](fsbridge_core::Status).
#[derive(Debug, Error)]
pub enum LoopbackError {
    /// The root path could not be stat'ed.
    #[error("cannot access loopback root {path:?}: {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The root path exists but is not a directory.
    #[error("loopback root {0:?} is not a directory")]
    NotADirectory(PathBuf),
}
