//! Instance registry.
//!
//! Several independent filesystems can be live in one process. Each is
//! addressed by an [`InstanceId`] handed out by [`Registry::register`].
//!
//! # Lifecycle
//!
//! 1. **Register**: the implementation moves into the table behind an `Arc`
//!    and receives a fresh id. Ids come from a monotonic counter and are
//!    never reused.
//! 2. **Dispatch**: [`Registry::acquire`] pins the instance for the length of
//!    one request, including its completion callback.
//! 3. **Deregister**: the id is unlinked at once, so new dispatches against it
//!    fail, and the call then blocks until pinned requests drain. The
//!    implementation is dropped by whoever releases the last `Arc`.
//!
//! Deregistering an id from inside a completion callback for that same id
//! waits on itself forever. Don't.
//!
//! The process-wide registry returned by [`global`] starts empty and is
//! emptied with [`Registry::drain`].

use dashmap::DashMap;
use fsbridge_core::FileSystem;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Opaque identifier of a registered filesystem instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wraps a raw id received from the transport layer.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs#{}", self.0)
    }
}

struct Instance {
    fs: Arc<dyn FileSystem>,
    /// Dispatches currently holding this instance.
    in_flight: Mutex<usize>,
    drained: Condvar,
}

/// A registered instance pinned for the duration of one dispatch.
///
/// While any guard for an instance is alive, [`Registry::deregister`] for
/// it does not return.
pub struct InstanceGuard {
    instance: Arc<Instance>,
}

impl Deref for InstanceGuard {
    type Target = dyn FileSystem;

    fn deref(&self) -> &Self::Target {
        self.instance.fs.as_ref()
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let mut count = self.instance.in_flight.lock();
        *count -= 1;
        if *count == 0 {
            self.instance.drained.notify_all();
        }
    }
}

/// Table from instance id to filesystem implementation.
pub struct Registry {
    instances: DashMap<InstanceId, Arc<Instance>>,
    /// Starts at 1; 0 is never handed out.
    next_id: AtomicU64,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an implementation and returns its id.
    pub fn register<F>(&self, fs: F) -> InstanceId
    where
        F: FileSystem + 'static,
    {
        self.register_shared(Arc::new(fs))
    }

    /// Registers an implementation the caller keeps a reference to.
    pub fn register_shared(&self, fs: Arc<dyn FileSystem>) -> InstanceId {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.instances.insert(
            id,
            Arc::new(Instance {
                fs,
                in_flight: Mutex::new(0),
                drained: Condvar::new(),
            }),
        );
        debug!(instance = %id, "filesystem registered");
        id
    }

    /// Removes an instance, waiting for in-flight dispatches against it.
    ///
    /// Returns the implementation, or `None` if the id was not registered.
    pub fn deregister(&self, id: InstanceId) -> Option<Arc<dyn FileSystem>> {
        let (_, instance) = self.instances.remove(&id)?;

        let mut count = instance.in_flight.lock();
        if *count > 0 {
            debug!(instance = %id, in_flight = *count, "waiting for dispatches to drain");
        }
        while *count > 0 {
            instance.drained.wait(&mut count);
        }
        drop(count);

        debug!(instance = %id, "filesystem deregistered");
        Some(Arc::clone(&instance.fs))
    }

    /// Pins an instance for one dispatch.
    ///
    /// The in-flight count is raised while the table entry is still borrowed,
    /// so a concurrent `deregister` either sees the count or never lets this
    /// lookup succeed.
    pub fn acquire(&self, id: InstanceId) -> Option<InstanceGuard> {
        self.instances.get(&id).map(|entry| {
            *entry.in_flight.lock() += 1;
            InstanceGuard {
                instance: Arc::clone(entry.value()),
            }
        })
    }

    /// Returns the implementation registered under `id`.
    pub fn get(&self, id: InstanceId) -> Option<Arc<dyn FileSystem>> {
        self.instances.get(&id).map(|entry| Arc::clone(&entry.fs))
    }

    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.contains_key(&id)
    }

    /// Number of registered instances.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Ids of all registered instances, in ascending order.
    pub fn ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<_> = self.instances.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Deregisters every instance, returning the implementations.
    pub fn drain(&self) -> Vec<(InstanceId, Arc<dyn FileSystem>)> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.deregister(id).map(|fs| (id, fs)))
            .collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("instances", &self.ids())
            .finish_non_exhaustive()
    }
}

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry.
pub fn global() -> &'static Registry {
    &GLOBAL
}

/// Registers a filesystem in the process-wide registry.
pub fn register_fs<F>(fs: F) -> InstanceId
where
    F: FileSystem + 'static,
{
    global().register(fs)
}

/// Removes a filesystem from the process-wide registry.
pub fn deregister_fs(id: InstanceId) -> Option<Arc<dyn FileSystem>> {
    global().deregister(id)
}
