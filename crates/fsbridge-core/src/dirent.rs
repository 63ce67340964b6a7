//! Directory entry accumulation under a byte budget.
//!
//! ReadDir replies are bounded by the size the kernel asked for. Entries are
//! charged at their encoded `fuse_dirent` size: a 24-byte header followed by
//! the name, padded to an 8-byte boundary.
//!
//! When an entry does not fit, [`DirEntryWriter::add`] refuses it and records
//! nothing. The implementation stops there; the next ReadDir arrives with the
//! offset of the last accepted entry and resumes with the refused one.

use crate::types::{FileType, InodeId};
use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

/// Size of the fixed `fuse_dirent` header (ino, off, namelen, type).
const DIRENT_HEADER_LEN: usize = 24;

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: InodeId,
    pub name: OsString,
    pub kind: FileType,
    /// Cursor of the entry that follows this one.
    pub offset: i64,
}

impl DirEntry {
    pub fn new(ino: InodeId, name: impl AsRef<OsStr>, kind: FileType, offset: i64) -> Self {
        Self {
            ino,
            name: name.as_ref().to_os_string(),
            kind,
            offset,
        }
    }

    /// Encoded size of this entry in a kernel reply buffer.
    pub fn encoded_len(&self) -> usize {
        dirent_size(self.name.as_bytes().len())
    }
}

/// Encoded size of a dirent whose name is `name_len` bytes long.
pub fn dirent_size(name_len: usize) -> usize {
    (DIRENT_HEADER_LEN + name_len + 7) & !7
}

/// Output sink for ReadDir.
#[derive(Debug)]
pub struct DirEntryWriter {
    budget: usize,
    used: usize,
    entries: Vec<DirEntry>,
}

impl DirEntryWriter {
    /// Creates a writer that accepts at most `budget` encoded bytes.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            entries: Vec::new(),
        }
    }

    /// Appends an entry. Returns `false` when the buffer is full; the entry
    /// is not recorded and should be offered again on the next call.
    pub fn add(&mut self, entry: DirEntry) -> bool {
        let len = entry.encoded_len();
        if self.used + len > self.budget {
            return false;
        }
        self.used += len;
        self.entries.push(entry);
        true
    }

    /// Convenience wrapper around [`add`](Self::add).
    pub fn push(&mut self, ino: InodeId, name: impl AsRef<OsStr>, kind: FileType, offset: i64) -> bool {
        self.add(DirEntry::new(ino, name, kind, offset))
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.budget - self.used
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<DirEntry> {
        self.entries
    }
}
