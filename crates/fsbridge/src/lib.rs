//! Bridge between kernel FUSE requests and in-process filesystem
//! implementations.
//!
//! Implementations are written against [`FileSystem`] from `fsbridge-core`
//! (re-exported here), registered in a [`Registry`], and driven through a
//! [`Dispatcher`]. Each dispatched request completes with one [`Reply`].
//!
//! ```
//! use fsbridge::{Dispatcher, MemFs, Registry, Reply, ROOT_INODE};
//!
//! let registry = Registry::new();
//! let id = registry.register(MemFs::new());
//! let dispatcher = Dispatcher::new(&registry);
//!
//! dispatcher.getattr(id, ROOT_INODE, None, |reply| match reply {
//!     Reply::Attr(attr) => assert_eq!(attr.ino, ROOT_INODE),
//!     other => panic!("unexpected {other:?}"),
//! });
//!
//! registry.deregister(id);
//! ```

pub mod dispatch;
pub mod registry;
pub mod reply;

pub use dispatch::{check_name, Dispatcher, NAME_MAX, XATTR_SIZE_MAX};
pub use registry::{deregister_fs, global, register_fs, InstanceGuard, InstanceId, Registry};
pub use reply::Reply;

pub use fsbridge_core::*;
