//! In-memory block store and a reconciler that writes through it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use super::{BlockAddr, BlockManager, ReconcileError, ReconcileResult, Reconciler};
use crate::page::Page;
use crate::tree::TreeId;

/// Block manager keeping page images as sizes in a map.
pub struct MemBlockStore {
    blocks: Mutex<HashMap<u64, u64>>,
    next: AtomicU64,
    freed: AtomicU64,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(HashMap::with_capacity(1024)),
            next: AtomicU64::new(1),
            freed: AtomicU64::new(0),
        }
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of blocks released so far.
    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Relaxed)
    }
}

impl Default for MemBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockManager for MemBlockStore {
    fn read_page(&self, addr: BlockAddr) -> Result<u64, ReconcileError> {
        self.blocks
            .lock()
            .get(&addr.0)
            .copied()
            .ok_or_else(|| ReconcileError::Rejected(format!("no block at {}", addr.0)))
    }

    fn write_page(&self, size: u64) -> Result<BlockAddr, ReconcileError> {
        let addr = self.next.fetch_add(1, Ordering::Relaxed);
        self.blocks.lock().insert(addr, size);
        Ok(BlockAddr(addr))
    }

    fn free_block(&self, addr: BlockAddr) {
        if self.blocks.lock().remove(&addr.0).is_some() {
            self.freed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Reconciler writing the page's current footprint through a block manager.
///
/// Pages whose newest update is newer than `visible_below` are reported still
/// dirty, and the next `fail_next` calls fail outright.
pub struct StoreReconciler {
    store: Arc<dyn BlockManager>,
    fail_next: AtomicI64,
    visible_below: AtomicU64,
    calls: AtomicU64,
}

impl StoreReconciler {
    pub fn new(store: Arc<dyn BlockManager>) -> Self {
        Self {
            store,
            fail_next: AtomicI64::new(0),
            visible_below: AtomicU64::new(u64::MAX),
            calls: AtomicU64::new(0),
        }
    }

    /// Makes the next `n` reconciliations fail.
    pub fn fail_next(&self, n: i64) {
        self.fail_next.store(n, Ordering::Relaxed);
    }

    /// Updates newer than `txn` are not written.
    pub fn set_visible_below(&self, txn: u64) {
        self.visible_below.store(txn, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Reconciler for StoreReconciler {
    fn reconcile(&self, _tree: TreeId, page: &Page) -> Result<ReconcileResult, ReconcileError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_next.load(Ordering::Relaxed) > 0
            && self.fail_next.fetch_sub(1, Ordering::Relaxed) > 0
        {
            return Err(ReconcileError::Write("injected failure".to_string()));
        }

        if page.newest_txn() >= self.visible_below.load(Ordering::Relaxed) {
            return Ok(ReconcileResult {
                addr: None,
                written: 0,
                still_dirty: true,
            });
        }

        let size = page.footprint();
        let addr = self.store.write_page(size)?;
        Ok(ReconcileResult {
            addr: Some(addr),
            written: size,
            still_dirty: false,
        })
    }
}
