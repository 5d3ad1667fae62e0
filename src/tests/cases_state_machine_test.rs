use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use crate::error::EvictError;
use crate::page::{RefFlags, RefLock, RefState};
use crate::tests::support::{settings, TestEngine};

#[test]
fn test_two_lockers_exactly_one_wins() {
    let t = TestEngine::new(settings(64 << 20));
    let tree = t.engine.open_tree("t", false);
    let id = t.leaf(&tree, 0, 4096).expect("read in");
    let r = tree.get_ref(id.slot).expect("ref");

    for _ in 0..50 {
        let wins = Arc::new(AtomicUsize::new(0));
        let busy = Arc::new(AtomicUsize::new(0));
        let tried = Arc::new(Barrier::new(2));
        let start = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let r = r.clone();
                let (wins, busy, tried, start) = (wins.clone(), busy.clone(), tried.clone(), start.clone());
                thread::spawn(move || {
                    start.wait();
                    let res = RefLock::acquire(&r);
                    match &res {
                        Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                        Err(EvictError::Busy) => busy.fetch_add(1, Ordering::SeqCst),
                        Err(err) => panic!("unexpected error: {err}"),
                    };
                    // Hold the lock until both threads have tried.
                    tried.wait();
                    drop(res);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(busy.load(Ordering::SeqCst), 1);
        assert_eq!(r.state(), RefState::Mem);
    }
}

#[test]
fn test_unlock_restores_flags() {
    let t = TestEngine::new(settings(64 << 20));
    let tree = t.engine.open_tree("t", false);
    let id = t.internal(&tree, 2048);
    let r = tree.get_ref(id.slot).expect("ref");
    assert!(r.flags().contains(RefFlags::INTERNAL));

    let lock = RefLock::acquire(&r).expect("lock");
    assert_eq!(r.state(), RefState::Locked);
    assert!(r.flags().contains(RefFlags::INTERNAL));
    lock.unlock();

    assert_eq!(r.state(), RefState::Mem);
    assert!(r.flags().contains(RefFlags::INTERNAL));
}

#[test]
fn test_locked_page_cannot_be_modified_or_locked_again() {
    let t = TestEngine::new(settings(64 << 20));
    let tree = t.engine.open_tree("t", false);
    let id = t.leaf(&tree, 0, 4096).expect("read in");
    let r = tree.get_ref(id.slot).expect("ref");

    let lock = RefLock::acquire(&r).expect("lock");
    assert!(matches!(RefLock::acquire(&r), Err(EvictError::Busy)));

    let mut session = crate::txn::Session::new();
    session.begin(t.engine.txn());
    assert!(matches!(t.engine.modify_page(&session, id, 10), Err(EvictError::Busy)));
    session.end(t.engine.txn());

    drop(lock);
    assert_eq!(r.state(), RefState::Mem);
}

#[test]
fn test_evicted_clean_page_goes_on_disk_and_reads_back() {
    let t = TestEngine::new(settings(64 << 20));
    let tree = t.engine.open_tree("t", false);
    let id = t.leaf(&tree, 0, 4096).expect("read in");
    let r = tree.get_ref(id.slot).expect("ref");

    let page = t.engine.page(id).expect("page");
    let lock = RefLock::acquire(&r).expect("lock");
    let freed = t
        .engine
        .cache()
        .evict_page(&tree, lock, page, crate::evict::EvictFlags::CLEAN)
        .expect("evict");
    assert_eq!(freed, 4096);
    assert_eq!(r.state(), RefState::OnDisk);
    assert!(!t.resident(id));

    // Reading it again installs a new generation; the old handle stays dead.
    let again = t.engine.read_in(tree.id(), id.slot).expect("read in");
    assert_ne!(again.generation, id.generation);
    assert!(t.resident(again));
    assert!(!t.resident(id));
}

#[test]
fn test_dirty_page_without_address_ends_deleted() {
    let t = TestEngine::new(settings(64 << 20));
    let tree = t.engine.open_tree("t", false);
    let id = t
        .engine
        .create_page(tree.id(), Some(0), crate::page::PageKind::Leaf, 1024)
        .expect("create");
    let r = tree.get_ref(id.slot).expect("ref");
    assert!(r.addr().is_none());

    t.engine.mark_tree_dead(tree.id()).expect("mark dead");
    let page = t.engine.page(id).expect("page");
    let lock = RefLock::acquire(&r).expect("lock");
    t.engine
        .cache()
        .evict_page(&tree, lock, page, crate::evict::EvictFlags::CLEAN)
        .expect("discard");
    assert_eq!(r.state(), RefState::Deleted);
    assert_eq!(t.reconciler.calls(), 0);
}
