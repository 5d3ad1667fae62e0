use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::error::EvictError;
use crate::evict::AGGRESSIVE_MAX;
use crate::tests::support::{settings, TestEngine};
use crate::txn::Session;

const MB: u64 = 1 << 20;

fn reader(t: &TestEngine) -> Session {
    let mut s = Session::new();
    s.refresh(t.engine.txn());
    s
}

#[test]
fn test_below_targets_returns_immediately() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 50, MB);

    let before = t.engine.stats().progress;
    let started = Instant::now();
    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    assert!(started.elapsed() < Duration::from_millis(50));
    assert_eq!(t.engine.stats().progress, before);
    assert_eq!(t.engine.cache().counters().app_evicted.load(Ordering::Relaxed), 0);
    assert_eq!(t.engine.stats().bytes.inmem, 50 * MB);
}

#[test]
fn test_between_target_and_trigger_leaves_work_to_workers() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 90, MB);

    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    assert_eq!(t.engine.stats().bytes.inmem, 90 * MB);
}

#[test]
fn test_busy_thread_leaves_after_one_eviction() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 98, MB);

    t.engine.assist_if_needed(&reader(&t), true, false).expect("assist");
    assert_eq!(t.engine.stats().bytes.inmem, 97 * MB);
    assert_eq!(t.engine.cache().counters().app_evicted.load(Ordering::Relaxed), 1);
}

#[test]
fn test_readonly_ignores_dirty_pressure() {
    let t = TestEngine::new(settings(10 * MB));
    let tree = t.engine.open_tree("t", false);
    let ids = t.leaves(&tree, 3, MB);
    let mut writer = Session::new();
    writer.begin(t.engine.txn());
    for id in &ids {
        t.engine.modify_page(&writer, *id, 64).expect("modify");
    }
    writer.end(t.engine.txn());
    let dirty_before = t.engine.stats().bytes.dirty;
    assert!(dirty_before * 100 >= 20 * 10 * MB);

    t.engine.assist_if_needed(&reader(&t), false, true).expect("readonly assist");
    assert_eq!(t.engine.stats().bytes.dirty, dirty_before);

    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    let dirty_after = t.engine.stats().bytes.dirty;
    assert!(dirty_after * 100 < 20 * 10 * MB);
    assert!(t.reconciler.calls() >= 2);
}

#[test]
fn test_stuck_cache_rolls_back_oldest_transaction() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 97, MB);

    let mut oldest = Session::new();
    let mut younger = Session::new();
    oldest.begin(t.engine.txn());
    younger.begin(t.engine.txn());

    let cache = t.engine.cache();
    cache.update_flags();
    cache.state().raise_aggressive(AGGRESSIVE_MAX);
    assert!(cache.state().is_stuck());

    let err = t.engine.assist_if_needed(&oldest, false, false).unwrap_err();
    assert!(matches!(err, EvictError::RollbackRequired(_)));
    assert_eq!(cache.state().aggressive_score(), AGGRESSIVE_MAX - 1);
    assert_eq!(cache.counters().rollbacks.load(Ordering::Relaxed), 1);
    assert_eq!(t.engine.stats().bytes.inmem, 97 * MB);

    // A younger transaction is never chosen; it helps evict instead, and
    // leaves after one page because its snapshot holds others back.
    cache.state().raise_aggressive(1);
    assert!(cache.state().is_stuck());
    t.engine.assist_if_needed(&younger, false, false).expect("assist");
    assert_eq!(t.engine.stats().bytes.inmem, 96 * MB);
    assert_eq!(cache.counters().app_evicted.load(Ordering::Relaxed), 1);

    oldest.end(t.engine.txn());
    younger.end(t.engine.txn());
}

#[test]
fn test_assist_gives_up_after_timeout() {
    let t = TestEngine::new(settings(100 * MB).with_assist_timeout(Duration::from_millis(50)));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 97, MB);
    // Nothing can be evicted while the tree is exclusively held.
    t.engine.disable_eviction(tree.id()).expect("disable");

    let started = Instant::now();
    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(t.engine.stats().bytes.inmem, 97 * MB);
    assert!(t.engine.cache().counters().app_waits.load(Ordering::Relaxed) > 0);
    t.engine.enable_eviction(tree.id()).expect("enable");
}

#[test]
fn test_running_transaction_assists_like_a_busy_thread() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 98, MB);

    let mut other = Session::new();
    let mut mine = Session::new();
    other.begin(t.engine.txn());
    mine.begin(t.engine.txn());
    assert!(mine.pins_snapshot(t.engine.txn()));

    t.engine.assist_if_needed(&mine, false, false).expect("assist");
    assert_eq!(t.engine.stats().bytes.inmem, 97 * MB);
    assert_eq!(t.engine.cache().counters().app_evicted.load(Ordering::Relaxed), 1);

    mine.end(t.engine.txn());
    other.end(t.engine.txn());
    assert!(!mine.pins_snapshot(t.engine.txn()));
}

#[test]
fn test_full_cache_keeps_assisting_past_progress_quota() {
    let t = TestEngine::new(settings(100 * MB));
    let tree = t.engine.open_tree("t", false);
    t.leaves(&tree, 130, MB);

    // Far more than twenty pages must go before the cache drops under its
    // clean trigger.
    t.engine.assist_if_needed(&reader(&t), false, false).expect("assist");
    assert!(t.engine.stats().bytes.inmem < 95 * MB);
    assert!(t.engine.cache().counters().app_evicted.load(Ordering::Relaxed) > 30);
}
