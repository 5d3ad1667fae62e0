//! Eviction core: policy, selection, single-page eviction and the
//! application-assisted path. Background workers drive the same code.

pub mod assist;
pub mod page;
pub mod policy;
pub mod select;
pub mod settings;
pub mod state;
pub mod stuck;

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use crate::backend::{BlockManager, Reconciler};
use crate::error::{EvictError, Result};
use crate::page::Page;
use crate::tree::{ByteCounters, BytesSnapshot, Tree, TreeTable};
use crate::txn::{Session, TxnGlobal};
use crate::workers::evictor::Counters;

pub use policy::EvictFlags;
pub use settings::{ClassPct, EvictionSettings, TuningSettings};
pub use state::{EvictState, AGGRESSIVE_CUTOFF, AGGRESSIVE_MAX};

/// Wakes sleeping workers and application threads waiting for candidates.
pub struct Wakeup {
    epoch: Mutex<u64>,
    cond: Condvar,
}

impl Wakeup {
    fn new() -> Self {
        Self {
            epoch: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn notify_all(&self) {
        *self.epoch.lock() += 1;
        self.cond.notify_all();
    }

    /// Sleeps until the next notification or `timeout`.
    pub fn wait_for(&self, timeout: Duration) {
        let mut epoch = self.epoch.lock();
        let seen = *epoch;
        let _ = self.cond.wait_while_for(&mut epoch, |e| *e == seen, timeout);
    }
}

/// State shared by the engine handle, the worker pool and application
/// threads.
pub struct Cache {
    pub(crate) settings: EvictionSettings,
    pub(crate) state: EvictState,
    pub(crate) trees: TreeTable,
    pub(crate) txn: Arc<TxnGlobal>,
    pub(crate) bytes: ByteCounters,
    pub(crate) reconciler: Arc<dyn Reconciler>,
    pub(crate) blocks: Arc<dyn BlockManager>,
    pub(crate) counters: Counters,
    pub(crate) wake: Wakeup,
}

impl Cache {
    pub fn new(
        settings: EvictionSettings,
        txn: Arc<TxnGlobal>,
        reconciler: Arc<dyn Reconciler>,
        blocks: Arc<dyn BlockManager>,
    ) -> Self {
        Self {
            settings,
            state: EvictState::new(),
            trees: TreeTable::new(),
            txn,
            bytes: ByteCounters::new(),
            reconciler,
            blocks,
            counters: Counters::new(),
            wake: Wakeup::new(),
        }
    }

    pub fn settings(&self) -> &EvictionSettings {
        &self.settings
    }

    pub fn state(&self) -> &EvictState {
        &self.state
    }

    pub fn trees(&self) -> &TreeTable {
        &self.trees
    }

    pub fn txn(&self) -> &TxnGlobal {
        &self.txn
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn bytes(&self) -> BytesSnapshot {
        self.bytes.snapshot()
    }

    /// Recomputes the eviction flags from the current counters and
    /// publishes them.
    pub fn update_flags(&self) -> EvictFlags {
        let flags = policy::compute(&self.bytes.snapshot(), &self.settings, self.state.is_aggressive());
        self.state.set_flags(flags);
        flags
    }

    /// The tree's counters and the cache-wide ones.
    pub(crate) fn byte_counters<'a>(&'a self, tree: &'a Tree) -> [&'a ByteCounters; 2] {
        [tree.bytes(), &self.bytes]
    }

    /// Queues `page` in its tree's buckets. A page that cannot be queued
    /// stays resident and unqueued until its next access.
    pub(crate) fn enqueue(&self, tree: &Tree, page: &Page) -> Result<()> {
        match tree.ring().enqueue(page) {
            Ok(loc) => {
                if self.settings.diagnostic {
                    if let Err(err) = tree.ring().check_placement(page, loc) {
                        error!(
                            component = "evictor",
                            event = "bucket_misplaced",
                            tree = tree.name(),
                            error = %err
                        );
                        return Err(err);
                    }
                }
                Ok(())
            }
            Err(EvictError::OutOfMemory) => {
                Counters::inc(&self.counters.lost_enqueues);
                Err(EvictError::OutOfMemory)
            }
            Err(err) => Err(err),
        }
    }

    /// Re-queues a page eviction gave back; failures only cost ordering.
    pub(crate) fn requeue(&self, tree: &Tree, page: &Page) {
        if let Err(err) = self.enqueue(tree, page) {
            warn!(
                component = "evictor",
                event = "requeue_failed",
                tree = tree.name(),
                slot = page.id().slot,
                error = %err
            );
        }
    }

    /// Checks every queued page of `tree` against its bucket.
    pub fn verify_buckets(&self, tree: &Tree) -> Result<()> {
        tree.ring().verify(|key| tree.resolve(key).map(|(_, page)| page))
    }

    /// Selects and evicts one page on behalf of `session`.
    ///
    /// Returns the bytes released; `Busy` and `NotFound` mean nothing was
    /// evicted in this attempt.
    pub fn evict_one(&self, session: &Session, flags: EvictFlags) -> Result<u64> {
        let candidates = self.candidate_trees(flags);
        if candidates.is_empty() {
            return Err(EvictError::NotFound);
        }
        let mut busy = false;
        for tree in candidates {
            if !tree.enter_evict() {
                busy = true;
                continue;
            }
            let chosen = self.choose_page(&tree, flags, session);
            let res = match chosen {
                Some((lock, page)) => Some(self.evict_page(&tree, lock, page, flags)),
                None => None,
            };
            tree.leave_evict();
            if let Some(res) = res {
                return res;
            }
        }
        if busy {
            return Err(EvictError::Busy);
        }
        Err(EvictError::NotFound)
    }
}
