//! Minimal transaction table: ids, the oldest running id and per-thread
//! snapshots. Eviction only reads these to decide whether a page's updates
//! are still needed and which thread is holding the cache back.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

/// Id reserved for "no transaction".
pub const TXN_NONE: u64 = 0;

pub struct TxnGlobal {
    current: AtomicU64,
    oldest: AtomicU64,
    running: Mutex<BTreeSet<u64>>,
}

impl TxnGlobal {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(1),
            oldest: AtomicU64::new(1),
            running: Mutex::new(BTreeSet::new()),
        }
    }

    /// Next id to be allocated.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Oldest id still running, or `current` when nothing runs.
    pub fn oldest(&self) -> u64 {
        self.oldest.load(Ordering::Acquire)
    }

    pub fn running(&self) -> usize {
        self.running.lock().len()
    }

    fn begin(&self) -> (u64, Snapshot) {
        let mut running = self.running.lock();
        let id = self.current.fetch_add(1, Ordering::AcqRel);
        let snap = Snapshot {
            min: running.first().copied().unwrap_or(id),
            max: id,
            concurrent: running.iter().copied().collect(),
        };
        running.insert(id);
        self.refresh_oldest(&running);
        (id, snap)
    }

    fn end(&self, id: u64) {
        let mut running = self.running.lock();
        running.remove(&id);
        self.refresh_oldest(&running);
    }

    fn snapshot(&self) -> Snapshot {
        let running = self.running.lock();
        let max = self.current();
        Snapshot {
            min: running.first().copied().unwrap_or(max),
            max,
            concurrent: running.iter().copied().collect(),
        }
    }

    fn refresh_oldest(&self, running: &BTreeSet<u64>) {
        let oldest = running.first().copied().unwrap_or_else(|| self.current());
        self.oldest.store(oldest, Ordering::Release);
    }
}

impl Default for TxnGlobal {
    fn default() -> Self {
        Self::new()
    }
}

/// Ids visible to a reader: everything below `min`, and everything below
/// `max` that was not running when the snapshot was taken.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    min: u64,
    max: u64,
    concurrent: Vec<u64>,
}

impl Snapshot {
    fn visible(&self, id: u64) -> bool {
        if id < self.min {
            return true;
        }
        id < self.max && !self.concurrent.contains(&id)
    }
}

/// Per-thread transaction context.
#[derive(Debug, Default)]
pub struct Session {
    txn: Option<u64>,
    snapshot: Snapshot,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, global: &TxnGlobal) -> u64 {
        if let Some(id) = self.txn.take() {
            global.end(id);
        }
        let (id, snap) = global.begin();
        self.txn = Some(id);
        self.snapshot = snap;
        id
    }

    /// Ends the running transaction; commit and rollback look the same here.
    pub fn end(&mut self, global: &TxnGlobal) {
        if let Some(id) = self.txn.take() {
            global.end(id);
        }
    }

    pub fn txn_id(&self) -> Option<u64> {
        self.txn
    }

    /// Takes a fresh read-only snapshot when no transaction is running.
    pub fn refresh(&mut self, global: &TxnGlobal) {
        if self.txn.is_none() {
            self.snapshot = global.snapshot();
        }
    }

    /// Whether this session's transaction is the oldest one running.
    pub fn is_oldest(&self, global: &TxnGlobal) -> bool {
        self.txn.is_some_and(|id| id == global.oldest())
    }

    /// Whether this session's running transaction pins a snapshot while
    /// others still need older ones.
    pub fn pins_snapshot(&self, global: &TxnGlobal) -> bool {
        self.txn.is_some() && global.current() != global.oldest()
    }

    /// Whether an update by transaction `id` is visible to this session.
    pub fn visible(&self, id: u64) -> bool {
        id == TXN_NONE || self.snapshot.visible(id) || self.txn == Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oldest_tracks_running_set() {
        let global = TxnGlobal::new();
        let mut a = Session::new();
        let mut b = Session::new();
        let ida = a.begin(&global);
        let idb = b.begin(&global);
        assert_eq!(global.oldest(), ida);
        assert!(a.is_oldest(&global));
        assert!(!b.is_oldest(&global));
        a.end(&global);
        assert_eq!(global.oldest(), idb);
        b.end(&global);
        assert_eq!(global.oldest(), global.current());
        assert_eq!(global.running(), 0);
    }

    #[test]
    fn test_snapshot_hides_concurrent_and_future_ids() {
        let global = TxnGlobal::new();
        let mut a = Session::new();
        let mut b = Session::new();
        let ida = a.begin(&global);
        let idb = b.begin(&global);
        assert!(!b.visible(ida));
        assert!(b.visible(idb));
        assert!(!a.visible(idb));
        a.end(&global);

        let mut reader = Session::new();
        reader.refresh(&global);
        assert!(reader.visible(ida));
        assert!(!reader.visible(idb));
        assert!(!reader.visible(global.current()));
    }
}
