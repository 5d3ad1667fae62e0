//! Evicting one locked page.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use super::policy::EvictFlags;
use super::Cache;
use crate::error::{EvictError, Result};
use crate::page::{Page, RefLock, RefState};
use crate::tree::Tree;
use crate::workers::evictor::Counters;

impl Cache {
    /// Evicts `page`, whose reference `lock` holds.
    ///
    /// Dirty pages are reconciled first. Under scrub (and always in
    /// in-memory mode) a reconciled page stays resident as a clean page;
    /// otherwise it is discarded. On any failure the reference is restored
    /// and the page queued again. Returns the bytes released.
    pub fn evict_page(&self, tree: &Tree, lock: RefLock, page: Arc<Page>, flags: EvictFlags) -> Result<u64> {
        tree.ring().remove(&page);

        if tree.is_dead() {
            return Ok(self.discard(tree, lock, &page));
        }

        if page.is_dirty() {
            let r = lock.reference().clone();
            let res = match self.reconciler.reconcile(tree.id(), &page) {
                Ok(res) => res,
                Err(err) => {
                    Counters::inc(&self.counters.reconcile_failures);
                    page.set_evict_retry(self.txn.oldest());
                    lock.unlock();
                    self.requeue(tree, &page);
                    warn!(
                        component = "evictor",
                        event = "reconcile_failed",
                        tree = tree.name(),
                        slot = r.slot(),
                        error = %err
                    );
                    return Err(EvictError::Reconcile(err));
                }
            };
            if res.still_dirty {
                page.set_evict_retry(self.txn.oldest());
                lock.unlock();
                self.requeue(tree, &page);
                return Err(EvictError::Busy);
            }

            if let Some(old) = r.set_addr(res.addr) {
                if Some(old) != res.addr {
                    self.blocks.free_block(old);
                }
            }
            let footprint = page.footprint();
            let updates = page.take_update_bytes();
            if page.set_clean() {
                for c in self.byte_counters(tree) {
                    c.mark_clean(page.kind(), footprint, updates);
                }
            }

            if self.settings.in_memory || flags.contains(EvictFlags::SCRUB) {
                lock.unlock();
                self.requeue(tree, &page);
                Counters::inc(&self.counters.scrubbed_pages);
                self.state.add_progress();
                debug!(
                    component = "evictor",
                    event = "page_scrubbed",
                    tree = tree.name(),
                    slot = r.slot(),
                    written = res.written
                );
                return Ok(0);
            }
        } else if self.settings.in_memory {
            // Nowhere to put a clean page's image.
            lock.unlock();
            self.requeue(tree, &page);
            return Err(EvictError::Busy);
        }

        Ok(self.discard(tree, lock, &page))
    }

    /// Drops the page from memory and publishes the reference's new state.
    pub(crate) fn discard(&self, tree: &Tree, lock: RefLock, page: &Page) -> u64 {
        let r = lock.reference().clone();
        let bytes = page.footprint();
        let updates = page.take_update_bytes();
        let dirty = page.is_dirty();
        for c in self.byte_counters(tree) {
            c.page_out(page.kind(), bytes, dirty, updates);
        }
        if let Some(parent) = r.parent().and_then(|slot| tree.get_ref(slot)).and_then(|p| p.page()) {
            parent.child_out();
        }
        self.state.set_read_gen_oldest(page.read_gen());
        r.discard();

        let next = if r.addr().is_some() {
            RefState::OnDisk
        } else {
            RefState::Deleted
        };
        lock.finish(next);

        Counters::inc(&self.counters.evicted_pages);
        self.counters.evicted_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.state.add_progress();
        bytes
    }
}
