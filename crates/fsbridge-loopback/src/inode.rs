//! Inode table for the pass-through filesystem.
//!
//! Maps bridge inode numbers to host paths together with the last stat seen
//! for that path. Host inode numbers are used directly, except that the
//! host inode of the mount root is folded onto [`ROOT_INODE`].
//!
//! An entry lives while the kernel holds lookup references to it or a
//! handle opened on it is still outstanding. An entry whose name was
//! removed or replaced on the host is detached: it keeps its number but no
//! longer resolves to a path.
//!
//! Readers take the lock shared; lookups that insert or overwrite take it
//! exclusively.

use fsbridge_core::{FsResult, InoAttr, InodeId, Status, ROOT_INODE};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::trace;

#[derive(Debug, Clone)]
struct InodeEntry {
    /// `None` once the name has gone from the host.
    path: Option<PathBuf>,
    attr: InoAttr,
    /// Outstanding kernel references. The root entry ignores this.
    nlookup: u64,
    /// Handles opened on this inode and not yet released.
    open: u64,
}

impl InodeEntry {
    fn is_unreferenced(&self) -> bool {
        self.nlookup == 0 && self.open == 0
    }
}

/// Thread-safe map from inode number to host path.
#[derive(Debug)]
pub struct InodeTable {
    /// Host inode number of the mount root.
    root_native: u64,
    entries: RwLock<HashMap<InodeId, InodeEntry>>,
}

impl InodeTable {
    /// Creates a table seeded with the root directory.
    pub fn new(root: PathBuf, root_native: u64, mut root_attr: InoAttr) -> Self {
        root_attr.ino = ROOT_INODE;
        let mut entries = HashMap::new();
        entries.insert(
            ROOT_INODE,
            InodeEntry {
                path: Some(root),
                attr: root_attr,
                nlookup: 0,
                open: 0,
            },
        );
        Self {
            root_native,
            entries: RwLock::new(entries),
        }
    }

    /// Translates a host inode number into bridge numbering.
    pub fn bridge_ino(&self, native: u64) -> InodeId {
        if native == self.root_native {
            ROOT_INODE
        } else {
            native
        }
    }

    /// Host path of `ino`.
    pub fn path(&self, ino: InodeId) -> FsResult<PathBuf> {
        self.entries
            .read()
            .get(&ino)
            .and_then(|e| e.path.clone())
            .ok_or(Status::NoEntry)
    }

    /// Host path and cached attributes of `ino`.
    pub fn get(&self, ino: InodeId) -> FsResult<(PathBuf, InoAttr)> {
        self.entries
            .read()
            .get(&ino)
            .and_then(|e| Some((e.path.clone()?, e.attr.clone())))
            .ok_or(Status::NoEntry)
    }

    /// Inode whose current path is `path`, if any.
    pub fn ino_at(&self, path: &Path) -> Option<InodeId> {
        self.entries
            .read()
            .iter()
            .find(|(_, e)| e.path.as_deref() == Some(path))
            .map(|(&ino, _)| ino)
    }

    /// Records a successful lookup of `path`, inserting or overwriting the
    /// entry for `attr.ino`. Returns the new lookup count.
    pub fn remember(&self, path: PathBuf, attr: InoAttr) -> u64 {
        let ino = attr.ino;
        let mut entries = self.entries.write();
        let entry = entries.entry(ino).or_insert_with(|| InodeEntry {
            path: None,
            attr: attr.clone(),
            nlookup: 0,
            open: 0,
        });
        // The root keeps its mount path even when reached through "..".
        if ino != ROOT_INODE {
            entry.path = Some(path);
        }
        entry.attr = attr;
        entry.nlookup += 1;
        entry.nlookup
    }

    /// Replaces the cached attributes of `ino`.
    pub fn refresh(&self, ino: InodeId, attr: InoAttr) {
        if let Some(entry) = self.entries.write().get_mut(&ino) {
            entry.attr = attr;
        }
    }

    /// Drops `nlookup` references, evicting the entry when no references
    /// or open handles remain.
    ///
    /// Returns `true` if the entry was evicted. The root is never evicted.
    pub fn forget(&self, ino: InodeId, nlookup: u64) -> bool {
        if ino == ROOT_INODE {
            return false;
        }
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&ino) else {
            return false;
        };
        entry.nlookup = entry.nlookup.saturating_sub(nlookup);
        trace!(inode = ino, remaining = entry.nlookup, open = entry.open, "loopback: forget");
        if entry.is_unreferenced() {
            entries.remove(&ino);
            true
        } else {
            false
        }
    }

    /// Records a handle opened on `ino`.
    pub fn opened(&self, ino: InodeId) -> FsResult<()> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&ino).ok_or(Status::NoEntry)?;
        entry.open += 1;
        Ok(())
    }

    /// Records a released handle on `ino`, evicting the entry if it was
    /// the last thing keeping it alive. Returns `true` on eviction.
    pub fn closed(&self, ino: InodeId) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&ino) else {
            return false;
        };
        entry.open = entry.open.saturating_sub(1);
        if ino != ROOT_INODE && entry.is_unreferenced() {
            entries.remove(&ino);
            true
        } else {
            false
        }
    }

    /// Unbinds `ino` from its path after the name was removed or replaced.
    /// Lookup references and open handles are unaffected.
    pub fn detach(&self, ino: InodeId) {
        if ino == ROOT_INODE {
            return;
        }
        if let Some(entry) = self.entries.write().get_mut(&ino) {
            trace!(inode = ino, "loopback: detached");
            entry.path = None;
        }
    }

    /// Rewrites every path at or below `from` to live under `to`.
    pub fn rename_paths(&self, from: &Path, to: &Path) {
        let mut entries = self.entries.write();
        for (&ino, entry) in entries.iter_mut() {
            if ino == ROOT_INODE {
                continue;
            }
            let Some(path) = entry.path.as_mut() else {
                continue;
            };
            if let Ok(rest) = path.strip_prefix(from) {
                *path = if rest.as_os_str().is_empty() {
                    to.to_path_buf()
                } else {
                    to.join(rest)
                };
            }
        }
    }

    /// Current lookup count of `ino`.
    pub fn nlookup(&self, ino: InodeId) -> Option<u64> {
        self.entries.read().get(&ino).map(|e| e.nlookup)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
