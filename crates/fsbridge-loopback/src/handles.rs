//! Open file and directory handles.
//!
//! Handle ids start at 1 and increase monotonically; 0 is never issued, so
//! a zeroed [`FileInfo`](fsbridge_core::FileInfo) never names a live handle.

use dashmap::DashMap;
use fsbridge_core::{DirEntry, FsResult, InodeId, Status};
use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What an open handle refers to.
#[derive(Debug, Clone)]
pub enum HandleKind {
    /// A host file descriptor.
    File(Arc<File>),
    /// Directory listing taken at opendir time.
    Dir(Arc<Vec<DirEntry>>),
}

#[derive(Debug, Clone)]
pub struct OpenHandle {
    pub ino: InodeId,
    pub kind: HandleKind,
}

/// Concurrent table of open handles.
#[derive(Debug)]
pub struct HandleTable {
    handles: DashMap<u64, OpenHandle>,
    next_id: AtomicU64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores a handle and returns its id.
    pub fn insert(&self, ino: InodeId, kind: HandleKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handles.insert(id, OpenHandle { ino, kind });
        id
    }

    /// The file behind handle `id`, which must belong to `ino`.
    pub fn file(&self, id: u64, ino: InodeId) -> FsResult<Arc<File>> {
        match self.handles.get(&id).map(|h| h.value().clone()) {
            Some(OpenHandle {
                ino: owner,
                kind: HandleKind::File(file),
            }) if owner == ino => Ok(file),
            _ => Err(Status::BadHandle),
        }
    }

    /// The listing behind handle `id`, which must belong to `ino`.
    pub fn dir(&self, id: u64, ino: InodeId) -> FsResult<Arc<Vec<DirEntry>>> {
        match self.handles.get(&id).map(|h| h.value().clone()) {
            Some(OpenHandle {
                ino: owner,
                kind: HandleKind::Dir(entries),
            }) if owner == ino => Ok(entries),
            _ => Err(Status::BadHandle),
        }
    }

    /// Closes handle `id`. The host descriptor is closed once no in-flight
    /// operation still holds it.
    pub fn remove(&self, id: u64, ino: InodeId) -> FsResult<OpenHandle> {
        self.handles
            .remove_if(&id, |_, handle| handle.ino == ino)
            .map(|(_, handle)| handle)
            .ok_or(Status::BadHandle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsbridge_core::FileType;

    fn listing() -> HandleKind {
        HandleKind::Dir(Arc::new(vec![DirEntry::new(1, ".", FileType::Directory, 1)]))
    }

    #[test]
    fn test_ids_start_at_one() {
        let table = HandleTable::new();
        let a = table.insert(1, listing());
        let b = table.insert(1, listing());
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_dir_handle_checks_owner_and_kind() {
        let table = HandleTable::new();
        let id = table.insert(5, listing());

        assert_eq!(table.dir(id, 5).unwrap().len(), 1);
        assert_eq!(table.dir(id, 6).unwrap_err(), Status::BadHandle);
        assert_eq!(table.file(id, 5).unwrap_err(), Status::BadHandle);
        assert_eq!(table.dir(id + 1, 5).unwrap_err(), Status::BadHandle);
    }

    #[test]
    fn test_file_handle() {
        let file = tempfile::tempfile().unwrap();
        let table = HandleTable::new();
        let id = table.insert(9, HandleKind::File(Arc::new(file)));

        assert!(table.file(id, 9).is_ok());
        assert_eq!(table.dir(id, 9).unwrap_err(), Status::BadHandle);
    }

    #[test]
    fn test_remove() {
        let table = HandleTable::new();
        let id = table.insert(5, listing());

        assert_eq!(table.remove(id, 6).unwrap_err(), Status::BadHandle);
        assert!(table.remove(id, 5).is_ok());
        assert_eq!(table.remove(id, 5).unwrap_err(), Status::BadHandle);
        assert!(table.is_empty());
    }
}
