use std::thread;
use std::time::Duration;

use crate::backoff::Immediate;
use crate::error::EvictError;
use crate::evict::{EvictFlags, AGGRESSIVE_CUTOFF};
use crate::tests::support::{settings, TestEngine};
use crate::txn::Session;

const MB: u64 = 1 << 20;

fn reader(t: &TestEngine) -> Session {
    let mut s = Session::new();
    s.refresh(t.engine.txn());
    s
}

#[test]
fn test_tree_with_oldest_bucket_is_chosen() {
    let t = TestEngine::new(settings(100 * MB));
    let hot = t.engine.open_tree("hot", false);
    let cold = t.engine.open_tree("cold", false);
    for id in t.leaves(&hot, 5, MB) {
        t.engine.touch_page(id, false).expect("touch");
    }
    t.leaves(&cold, 5, MB);

    let chosen = t.engine.cache().choose_tree(EvictFlags::CLEAN).expect("tree");
    assert_eq!(chosen.id(), cold.id());
    let order: Vec<_> = t
        .engine
        .cache()
        .candidate_trees(EvictFlags::CLEAN)
        .iter()
        .map(|tree| tree.id())
        .collect();
    assert_eq!(order, vec![cold.id(), hot.id()]);
}

#[test]
fn test_priority_tree_skipped_unless_aggressive() {
    let t = TestEngine::new(settings(100 * MB));
    let meta = t.engine.open_tree("meta", false);
    t.leaves(&meta, 5, MB);
    t.engine.set_tree_priority(meta.id(), 1).expect("priority");

    let cache = t.engine.cache();
    assert!(cache.choose_tree(EvictFlags::CLEAN).is_none());

    cache.state().raise_aggressive(AGGRESSIVE_CUTOFF);
    assert_eq!(cache.choose_tree(EvictFlags::CLEAN).map(|tree| tree.id()), Some(meta.id()));
}

#[test]
fn test_dominating_priority_tree_is_eligible() {
    let t = TestEngine::new(settings(100 * MB));
    let big = t.engine.open_tree("big", false);
    t.leaves(&big, 40, MB);
    t.engine.set_tree_priority(big.id(), 1).expect("priority");

    // 40MB is half of the 80% clean target.
    assert_eq!(t.engine.cache().choose_tree(EvictFlags::CLEAN).map(|tree| tree.id()), Some(big.id()));
}

#[test]
fn test_dead_tree_wins_and_skips_reconciliation() {
    let t = TestEngine::new(settings(100 * MB));
    let live = t.engine.open_tree("live", false);
    let dead = t.engine.open_tree("dead", false);
    t.leaves(&live, 5, MB);
    let id = t.leaf(&dead, 0, MB).expect("read in");
    let mut w = Session::new();
    w.begin(t.engine.txn());
    t.engine.modify_page(&w, id, 128).expect("modify");

    t.engine.mark_tree_dead(dead.id()).expect("mark dead");
    let candidates = t.engine.cache().candidate_trees(EvictFlags::CLEAN);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].id(), dead.id());
    assert_eq!(candidates[1].id(), live.id());

    // The writer is still running; a dead tree does not care.
    let freed = t.engine.cache().evict_one(&reader(&t), EvictFlags::CLEAN).expect("evict");
    assert_eq!(freed, MB + 128);
    assert_eq!(t.reconciler.calls(), 0);
    assert_eq!(dead.bytes().snapshot().dirty, 0);
    w.end(t.engine.txn());
}

#[test]
fn test_empty_dead_tree_does_not_block_live_trees() {
    let t = TestEngine::new(settings(100 * MB));
    let live = t.engine.open_tree("live", false);
    let dead = t.engine.open_tree("dead", false);
    t.leaves(&live, 96, MB);
    t.engine.mark_tree_dead(dead.id()).expect("mark dead");

    let candidates = t.engine.cache().candidate_trees(EvictFlags::CLEAN);
    assert_eq!(candidates.iter().map(|tree| tree.id()).collect::<Vec<_>>(), vec![live.id()]);

    let mut session = Session::new();
    assert_eq!(t.engine.evict_one(&mut session).expect("evict"), MB);

    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    assert!(t.engine.stats().bytes.inmem < 95 * MB);
}

#[test]
fn test_unbalanced_enable_is_refused() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 96, MB);

    assert!(matches!(t.engine.enable_eviction(tree.id()), Err(EvictError::Consistency(_))));
    assert_eq!(tree.disabled(), 0);

    t.engine.disable_eviction(tree.id()).expect("disable");
    assert_eq!(tree.disabled(), 1);
    let mut session = Session::new();
    assert!(matches!(t.engine.evict_one(&mut session), Err(EvictError::NotFound)));
    t.engine.enable_eviction(tree.id()).expect("enable");
    assert_eq!(t.engine.evict_one(&mut session).expect("evict"), MB);
}

#[test]
fn test_disabled_tree_is_not_selected() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 5, MB);

    t.engine.disable_eviction(tree.id()).expect("disable");
    t.engine.disable_eviction(tree.id()).expect("disable nested");
    assert!(matches!(
        t.engine.cache().evict_one(&reader(&t), EvictFlags::CLEAN),
        Err(EvictError::NotFound)
    ));

    t.engine.enable_eviction(tree.id()).expect("enable");
    assert!(t.engine.cache().choose_tree(EvictFlags::CLEAN).is_none());
    t.engine.enable_eviction(tree.id()).expect("enable");
    assert!(t.engine.cache().evict_one(&reader(&t), EvictFlags::CLEAN).is_ok());
}

#[test]
fn test_disable_waits_for_inflight_eviction() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    assert!(tree.enter_evict());

    let releaser = {
        let tree = tree.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            tree.leave_evict();
        })
    };
    t.engine.disable_eviction(tree.id()).expect("disable");
    assert_eq!(tree.busy(), 0);
    releaser.join().unwrap();
    t.engine.enable_eviction(tree.id()).expect("enable");
}

#[test]
fn test_disable_gives_up_when_eviction_never_drains() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    assert!(tree.enter_evict());

    let res = t.engine.disable_eviction_with(tree.id(), &mut Immediate(3));
    assert!(matches!(res, Err(EvictError::Busy)));
    assert_eq!(tree.disabled(), 0);
    tree.leave_evict();
}

#[test]
fn test_checkpointing_tree_keeps_dirty_pages() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    let ids = t.leaves(&tree, 2, MB);
    let mut w = Session::new();
    w.begin(t.engine.txn());
    t.engine.modify_page(&w, ids[0], 64).expect("modify");
    w.end(t.engine.txn());

    t.engine.set_checkpointing(tree.id(), true).expect("checkpoint");
    let cache = t.engine.cache();
    assert!(cache.choose_tree(EvictFlags::DIRTY).is_none());
    assert!(cache.choose_page(&tree, EvictFlags::DIRTY, &reader(&t)).is_none());

    // Clean-only eviction may still use the tree.
    let (_lock, page) = cache.choose_page(&tree, EvictFlags::CLEAN, &reader(&t)).expect("clean page");
    assert_eq!(page.id(), ids[1]);
    assert!(cache.choose_tree(EvictFlags::CLEAN).is_some());
}

#[test]
fn test_internal_page_with_resident_children_is_skipped() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    let parent = t.internal(&tree, 4096);
    let child = t.leaf(&tree, parent.slot, MB).expect("child");
    let cache = t.engine.cache();
    assert_eq!(t.engine.page(parent).expect("page").resident_children(), 1);

    assert!(cache.choose_page(&tree, EvictFlags::DIRTY, &reader(&t)).is_none());

    let (lock, page) = cache.choose_page(&tree, EvictFlags::CLEAN, &reader(&t)).expect("child");
    assert_eq!(page.id(), child);
    cache.evict_page(&tree, lock, page, EvictFlags::CLEAN).expect("evict child");
    assert_eq!(t.engine.page(parent).expect("page").resident_children(), 0);

    let (_lock, page) = cache.choose_page(&tree, EvictFlags::DIRTY, &reader(&t)).expect("parent");
    assert_eq!(page.id(), parent);
}

#[test]
fn test_running_writer_pins_its_pages() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    let id = t.leaf(&tree, 0, MB).expect("read in");
    let mut w = Session::new();
    w.begin(t.engine.txn());
    t.engine.modify_page(&w, id, 64).expect("modify");

    let cache = t.engine.cache();
    // Under hard pressure only a session that can see the update may take it.
    let hard = EvictFlags::DIRTY | EvictFlags::DIRTY_HARD;
    assert!(cache.choose_page(&tree, hard, &reader(&t)).is_none());
    assert!(cache.choose_page(&tree, hard, &w).is_some());

    // Too new for normal eviction; the page is then left alone until the
    // oldest transaction moves.
    assert!(cache.choose_page(&tree, EvictFlags::DIRTY, &reader(&t)).is_none());
    assert!(cache.choose_page(&tree, hard, &w).is_none());

    w.end(t.engine.txn());
    assert!(cache.choose_page(&tree, EvictFlags::DIRTY, &reader(&t)).is_some());
}

#[test]
fn test_aggressive_alone_does_not_relax_too_new_check() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    let id = t.leaf(&tree, 0, MB).expect("read in");
    let mut w = Session::new();
    w.begin(t.engine.txn());
    t.engine.modify_page(&w, id, 64).expect("modify");

    let cache = t.engine.cache();
    cache.state().raise_aggressive(AGGRESSIVE_CUTOFF);
    assert!(cache.state().is_aggressive());
    // The writer sees its own update, but without hard pressure the page is
    // still too new.
    assert!(cache.choose_page(&tree, EvictFlags::DIRTY, &w).is_none());
    w.end(t.engine.txn());
}

#[test]
fn test_metadata_history_and_splitting_pages_are_skipped() {
    let t = TestEngine::new(settings(100 * MB));
    let meta = t.engine.open_tree("meta", true);
    let id = t.leaf(&meta, 0, MB).expect("read in");
    let page = t.engine.page(id).expect("page");
    let cache = t.engine.cache();

    page.set_history_pinned(true);
    assert!(cache.choose_page(&meta, EvictFlags::CLEAN, &reader(&t)).is_none());
    page.set_history_pinned(false);

    page.set_splitting(true);
    assert!(cache.choose_page(&meta, EvictFlags::CLEAN, &reader(&t)).is_none());
    page.set_splitting(false);

    assert!(cache.choose_page(&meta, EvictFlags::CLEAN, &reader(&t)).is_some());
}
