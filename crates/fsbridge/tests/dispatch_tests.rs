//! End-to-end dispatch tests against the in-memory filesystem.

use fsbridge::{
    DefaultFileSystem, Dispatcher, FileInfo, FileSystem, FileType, InoAttr, InstanceId, MemFs,
    Registry, Reply, SetAttrMask, Status, ROOT_INODE,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("fsbridge=trace")),
        )
        .with_test_writer()
        .try_init();
}

/// Runs one dispatch and returns the reply it completed with.
fn call(f: impl FnOnce(&mut dyn FnMut(Reply))) -> Reply {
    let mut out = None;
    f(&mut |reply| {
        assert!(out.is_none(), "reply delivered twice");
        out = Some(reply);
    });
    out.expect("no reply delivered")
}

fn setup() -> (Registry, InstanceId) {
    init_tracing();
    let registry = Registry::new();
    let id = registry.register(MemFs::new());
    (registry, id)
}

fn entry_ino(reply: Reply) -> u64 {
    match reply {
        Reply::Entry(entry) => entry.ino,
        Reply::Create { entry, .. } => entry.ino,
        other => panic!("expected entry, got {other:?}"),
    }
}

#[test]
fn test_lookup_invalid_parent() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let reply = call(|cb| d.lookup(id, 1000, OsStr::new("anything"), cb));
    assert_eq!(reply, Reply::Error(Status::NoEntry));
    assert_eq!(reply.errno(), -libc::ENOENT);
}

#[test]
fn test_lookup_missing_name() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let reply = call(|cb| d.lookup(id, ROOT_INODE, OsStr::new("missing"), cb));
    assert_eq!(reply, Reply::Error(Status::NoEntry));
}

#[test]
fn test_lookup_existing_entry() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let created = entry_ino(call(|cb| d.mknod(id, ROOT_INODE, OsStr::new("exists"), 0o444, 0, cb)));

    match call(|cb| d.lookup(id, ROOT_INODE, OsStr::new("exists"), cb)) {
        Reply::Entry(entry) => {
            assert_eq!(entry.ino, created);
            assert_eq!(entry.attr.ino, created);
            assert_eq!(entry.attr.file_type(), Some(FileType::RegularFile));
            assert_eq!(entry.attr.perm(), 0o444);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn test_lookup_under_regular_file() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let file = entry_ino(call(|cb| d.mknod(id, ROOT_INODE, OsStr::new("exists"), 0o444, 0, cb)));

    let reply = call(|cb| d.lookup(id, file, OsStr::new("child"), cb));
    assert_eq!(reply, Reply::Error(Status::NotDirectory));
    assert_eq!(reply.errno(), -libc::ENOTDIR);
}

#[test]
fn test_forget_unknown_inode_is_silent() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    assert_eq!(call(|cb| d.forget(id, 12345, 3, cb)), Reply::None);
}

#[test]
fn test_getattr_root_and_unknown() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);

    match call(|cb| d.getattr(id, ROOT_INODE, None, cb)) {
        Reply::Attr(attr) => {
            assert_eq!(attr.ino, ROOT_INODE);
            assert!(attr.is_dir());
        }
        other => panic!("unexpected reply {other:?}"),
    }
    assert_eq!(
        call(|cb| d.getattr(id, 1000, None, cb)),
        Reply::Error(Status::NoEntry)
    );
}

#[test]
fn test_statfs_answers_for_any_inode() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    match call(|cb| d.statfs(id, 0, cb)) {
        Reply::StatFs(st) => {
            assert!(st.block_size > 0);
            assert_eq!(st.name_max, 255);
        }
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn test_default_filesystem_answers_not_supported() {
    init_tracing();
    let registry = Registry::new();
    let id = registry.register(DefaultFileSystem);
    let d = Dispatcher::new(&registry);
    let fi = FileInfo::default();
    let name = OsStr::new("x");
    let enosys = Reply::Error(Status::NotSupported);

    assert_eq!(call(|cb| d.statfs(id, 1, cb)), enosys);
    assert_eq!(call(|cb| d.lookup(id, 1, name, cb)), enosys);
    assert_eq!(call(|cb| d.getattr(id, 1, None, cb)), enosys);
    assert_eq!(
        call(|cb| d.setattr(id, 1, &InoAttr::new(1, 0), SetAttrMask::MODE, None, cb)),
        enosys
    );
    assert_eq!(call(|cb| d.readlink(id, 1, cb)), enosys);
    assert_eq!(call(|cb| d.readdir(id, 1, fi, 0, 4096, cb)), enosys);
    assert_eq!(call(|cb| d.mknod(id, 1, name, 0o644, 0, cb)), enosys);
    assert_eq!(call(|cb| d.mkdir(id, 1, name, 0o755, cb)), enosys);
    assert_eq!(call(|cb| d.create(id, 1, name, 0o644, fi, cb)), enosys);
    assert_eq!(call(|cb| d.symlink(id, Path::new("t"), 1, name, cb)), enosys);
    assert_eq!(call(|cb| d.link(id, 2, 1, name, cb)), enosys);
    assert_eq!(call(|cb| d.open(id, 2, fi, cb)), enosys);
    assert_eq!(call(|cb| d.read(id, 2, 10, 0, fi, cb)), enosys);
    assert_eq!(call(|cb| d.write(id, 2, b"abc", 0, fi, cb)), enosys);
    assert_eq!(call(|cb| d.flush(id, 2, fi, cb)), enosys);
    assert_eq!(call(|cb| d.release(id, 2, fi, cb)), enosys);
    assert_eq!(call(|cb| d.fsync(id, 2, false, fi, cb)), enosys);
    assert_eq!(call(|cb| d.releasedir(id, 1, fi, cb)), enosys);
    assert_eq!(call(|cb| d.fsyncdir(id, 1, true, fi, cb)), enosys);
    assert_eq!(call(|cb| d.rename(id, 1, name, 1, OsStr::new("y"), cb)), enosys);
    assert_eq!(call(|cb| d.unlink(id, 1, name, cb)), enosys);
    assert_eq!(call(|cb| d.rmdir(id, 1, name, cb)), enosys);
    assert_eq!(call(|cb| d.access(id, 1, libc::R_OK, cb)), enosys);
    assert_eq!(call(|cb| d.listxattr(id, 1, 0, cb)), enosys);
    assert_eq!(call(|cb| d.getxattr(id, 1, OsStr::new("user.a"), 0, cb)), enosys);
    assert_eq!(call(|cb| d.getxattr(id, 1, OsStr::new("user.a"), 16, cb)), enosys);
    assert_eq!(
        call(|cb| d.setxattr(id, 1, OsStr::new("user.a"), b"v", 0, cb)),
        enosys
    );
    assert_eq!(call(|cb| d.removexattr(id, 1, OsStr::new("user.a"), cb)), enosys);

    // Lifecycle calls and opendir succeed without an implementation.
    assert_eq!(call(|cb| d.opendir(id, 1, fi, cb)), Reply::Open(fi));
    assert_eq!(call(|cb| d.forget(id, 1, 1, cb)), Reply::None);
    assert_eq!(call(|cb| d.destroy(id, cb)), Reply::Empty);
}

#[test]
fn test_name_validation() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let long = "n".repeat(256);

    assert_eq!(
        call(|cb| d.mkdir(id, ROOT_INODE, OsStr::new(""), 0o755, cb)),
        Reply::Error(Status::InvalidArgument)
    );
    assert_eq!(
        call(|cb| d.mknod(id, ROOT_INODE, OsStr::new("a/b"), 0o644, 0, cb)),
        Reply::Error(Status::InvalidArgument)
    );
    assert_eq!(
        call(|cb| d.lookup(id, ROOT_INODE, OsStr::new(&long), cb)),
        Reply::Error(Status::NameTooLong)
    );
    assert_eq!(
        call(|cb| d.rename(id, ROOT_INODE, OsStr::new("a"), ROOT_INODE, OsStr::new(&long), cb)),
        Reply::Error(Status::NameTooLong)
    );
}

#[test]
fn test_file_round_trip() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);

    let (ino, fi) = match call(|cb| {
        d.create(id, ROOT_INODE, OsStr::new("notes"), 0o644, FileInfo::with_flags(libc::O_RDWR), cb)
    }) {
        Reply::Create { entry, info } => (entry.ino, info),
        other => panic!("unexpected reply {other:?}"),
    };

    assert_eq!(call(|cb| d.write(id, ino, b"hello world", 0, fi, cb)), Reply::Written(11));
    assert_eq!(call(|cb| d.write(id, ino, b"WORLD", 6, fi, cb)), Reply::Written(5));
    assert_eq!(
        call(|cb| d.read(id, ino, 64, 0, fi, cb)),
        Reply::Data(b"hello WORLD".to_vec())
    );
    assert_eq!(
        call(|cb| d.read(id, ino, 3, 2, fi, cb)),
        Reply::Data(b"llo".to_vec())
    );
    assert_eq!(call(|cb| d.flush(id, ino, fi, cb)), Reply::Empty);
    assert_eq!(call(|cb| d.fsync(id, ino, true, fi, cb)), Reply::Empty);
    assert_eq!(call(|cb| d.release(id, ino, fi, cb)), Reply::Empty);

    // The handle is gone after release.
    assert_eq!(
        call(|cb| d.read(id, ino, 64, 0, fi, cb)),
        Reply::Error(Status::BadHandle)
    );

    match call(|cb| d.getattr(id, ino, None, cb)) {
        Reply::Attr(attr) => assert_eq!(attr.size, 11),
        other => panic!("unexpected reply {other:?}"),
    }
}

#[test]
fn test_readdir_respects_byte_budget() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    for name in ["a", "b", "c"] {
        call(|cb| d.mknod(id, ROOT_INODE, OsStr::new(name), 0o644, 0, cb));
    }

    let fi = match call(|cb| d.opendir(id, ROOT_INODE, FileInfo::default(), cb)) {
        Reply::Open(fi) => fi,
        other => panic!("unexpected reply {other:?}"),
    };

    // Every short name costs 32 bytes; a 64 byte budget fits two.
    let mut names = Vec::new();
    let mut offset = 0;
    loop {
        let entries = match call(|cb| d.readdir(id, ROOT_INODE, fi, offset, 64, cb)) {
            Reply::Directory(entries) => entries,
            other => panic!("unexpected reply {other:?}"),
        };
        if entries.is_empty() {
            break;
        }
        assert!(entries.len() <= 2);
        offset = entries.last().map(|e| e.offset).unwrap_or(offset);
        names.extend(entries.into_iter().map(|e| e.name));
    }

    let names: Vec<_> = names.iter().map(|n| n.to_string_lossy().into_owned()).collect();
    assert_eq!(names, vec![".", "..", "a", "b", "c"]);
    assert_eq!(call(|cb| d.releasedir(id, ROOT_INODE, fi, cb)), Reply::Empty);
}

#[test]
fn test_namespace_operations() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);

    let dir = entry_ino(call(|cb| d.mkdir(id, ROOT_INODE, OsStr::new("dir"), 0o755, cb)));
    let file = entry_ino(call(|cb| d.mknod(id, dir, OsStr::new("f"), 0o600, 0, cb)));
    let link = entry_ino(call(|cb| {
        d.symlink(id, Path::new("dir/f"), ROOT_INODE, OsStr::new("ln"), cb)
    }));
    assert_eq!(
        call(|cb| d.readlink(id, link, cb)),
        Reply::ReadLink(PathBuf::from("dir/f"))
    );

    let hard = entry_ino(call(|cb| d.link(id, file, ROOT_INODE, OsStr::new("hard"), cb)));
    assert_eq!(hard, file);

    assert_eq!(
        call(|cb| d.rmdir(id, ROOT_INODE, OsStr::new("dir"), cb)),
        Reply::Error(Status::NotEmpty)
    );
    assert_eq!(
        call(|cb| d.rename(id, dir, OsStr::new("f"), ROOT_INODE, OsStr::new("moved"), cb)),
        Reply::Empty
    );
    assert_eq!(
        call(|cb| d.lookup(id, dir, OsStr::new("f"), cb)),
        Reply::Error(Status::NoEntry)
    );
    assert_eq!(call(|cb| d.rmdir(id, ROOT_INODE, OsStr::new("dir"), cb)), Reply::Empty);
    assert_eq!(call(|cb| d.unlink(id, ROOT_INODE, OsStr::new("moved"), cb)), Reply::Empty);
    assert_eq!(call(|cb| d.unlink(id, ROOT_INODE, OsStr::new("hard"), cb)), Reply::Empty);
    assert_eq!(
        call(|cb| d.unlink(id, ROOT_INODE, OsStr::new("hard"), cb)),
        Reply::Error(Status::NoEntry)
    );
}

#[test]
fn test_xattr_operations() {
    let (registry, id) = setup();
    let d = Dispatcher::new(&registry);
    let name = OsStr::new("user.color");

    assert_eq!(
        call(|cb| d.setxattr(id, ROOT_INODE, name, b"blue", 0, cb)),
        Reply::Empty
    );
    assert_eq!(
        call(|cb| d.getxattr(id, ROOT_INODE, name, 0, cb)),
        Reply::XAttrSize(4)
    );
    assert_eq!(
        call(|cb| d.getxattr(id, ROOT_INODE, name, 4, cb)),
        Reply::Data(b"blue".to_vec())
    );
    assert_eq!(
        call(|cb| d.listxattr(id, ROOT_INODE, 0, cb)),
        Reply::XAttrSize(11)
    );
    assert_eq!(call(|cb| d.removexattr(id, ROOT_INODE, name, cb)), Reply::Empty);
    assert_eq!(
        call(|cb| d.getxattr(id, ROOT_INODE, name, 0, cb)),
        Reply::Error(Status::NoAttribute)
    );
}

#[test]
fn test_instances_are_isolated() {
    init_tracing();
    let registry = Registry::new();
    let a = registry.register(MemFs::new());
    let b = registry.register(MemFs::new());
    let d = Dispatcher::new(&registry);

    call(|cb| d.mknod(a, ROOT_INODE, OsStr::new("only-in-a"), 0o644, 0, cb));
    assert!(matches!(
        call(|cb| d.lookup(a, ROOT_INODE, OsStr::new("only-in-a"), cb)),
        Reply::Entry(_)
    ));
    assert_eq!(
        call(|cb| d.lookup(b, ROOT_INODE, OsStr::new("only-in-a"), cb)),
        Reply::Error(Status::NoEntry)
    );
}

#[test]
fn test_reregistration_gets_fresh_id() {
    init_tracing();
    let registry = Registry::new();
    let fs = Arc::new(MemFs::new());
    let first = registry.register_shared(fs.clone());
    registry.deregister(first);
    let second = registry.register_shared(fs);
    assert_ne!(first, second);

    let d = Dispatcher::new(&registry);
    assert!(matches!(
        call(|cb| d.getattr(second, ROOT_INODE, None, cb)),
        Reply::Attr(_)
    ));
}

#[test]
fn test_deregister_waits_for_reply_callback() {
    init_tracing();
    let registry = Arc::new(Registry::new());
    let id = registry.register(MemFs::new());
    let entered = Arc::new(Barrier::new(2));
    let deregistered = Arc::new(AtomicBool::new(false));

    let dispatcher_thread = {
        let registry = Arc::clone(&registry);
        let entered = Arc::clone(&entered);
        let deregistered = Arc::clone(&deregistered);
        thread::spawn(move || {
            Dispatcher::new(&registry).getattr(id, ROOT_INODE, None, |reply| {
                entered.wait();
                thread::sleep(Duration::from_millis(50));
                // Still inside the dispatch: deregistration must not have finished.
                assert!(!deregistered.load(Ordering::SeqCst));
                assert!(matches!(reply, Reply::Attr(_)));
            });
        })
    };

    entered.wait();
    let fs = registry.deregister(id);
    deregistered.store(true, Ordering::SeqCst);
    dispatcher_thread.join().unwrap();

    assert!(fs.is_some());
    assert!(!registry.contains(id));
}

#[test]
fn test_concurrent_dispatch_across_instances() {
    init_tracing();
    let registry = Arc::new(Registry::new());
    let ids: Vec<_> = (0..4).map(|_| registry.register(MemFs::new())).collect();

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let d = Dispatcher::new(&registry);
                for i in 0..50 {
                    let name = format!("f{i}");
                    let reply = call(|cb| d.mknod(id, ROOT_INODE, OsStr::new(&name), 0o644, 0, cb));
                    assert!(matches!(reply, Reply::Entry(_)));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for id in ids {
        let fs = registry.deregister(id).unwrap();
        assert!(fs.lookup(ROOT_INODE, OsStr::new("f49")).is_ok());
    }
    assert!(registry.is_empty());
}

#[test]
fn test_global_dispatcher() {
    init_tracing();
    let id = fsbridge::register_fs(MemFs::new());
    let d = Dispatcher::global();
    assert!(matches!(
        call(|cb| d.statfs(id, ROOT_INODE, cb)),
        Reply::StatFs(_)
    ));
    assert!(fsbridge::deregister_fs(id).is_some());
}
