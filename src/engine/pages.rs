//! Page lifecycle hooks called by the tree layer on every access, modify,
//! create and free.

use std::sync::Arc;

use super::Engine;
use crate::error::{EvictError, Result};
use crate::page::{readgen, Page, PageId, PageKind, Ref, RefFlags, RefLock, RefState};
use crate::tree::{Tree, TreeId};
use crate::txn::Session;

fn kind_of(r: &Ref) -> PageKind {
    if r.flags().contains(RefFlags::INTERNAL) {
        PageKind::Internal
    } else {
        PageKind::Leaf
    }
}

impl Engine {
    fn resolve(&self, id: PageId) -> Result<(Arc<Tree>, Arc<Ref>, Arc<Page>)> {
        let tree = self.tree(id.tree)?;
        let r = tree.get_ref(id.slot).ok_or(EvictError::PageNotFound)?;
        let page = r.page_if(id.generation).ok_or(EvictError::PageNotFound)?;
        Ok((tree, r, page))
    }

    /// The resident page behind `id`.
    pub fn page(&self, id: PageId) -> Result<Arc<Page>> {
        self.resolve(id).map(|(_, _, page)| page)
    }

    /// Installs a page on a locked reference and makes it visible.
    fn install(&self, tree: &Tree, lock: RefLock, footprint: u64, dirty: bool) -> Result<PageId> {
        let r = lock.reference().clone();
        let kind = kind_of(&r);
        let id = PageId {
            tree: tree.id(),
            slot: r.slot(),
            generation: r.next_generation(),
        };
        let page = Arc::new(Page::new(id, kind, footprint, dirty));
        page.set_read_gen(self.cache.state().new_page_gen());
        r.install(page.clone());

        for c in self.cache.byte_counters(tree) {
            c.page_in(kind, footprint, dirty);
        }
        if let Some(parent) = r.parent().and_then(|slot| tree.get_ref(slot)).and_then(|p| p.page()) {
            parent.child_in();
        }
        lock.finish(RefState::Mem);

        // An unqueued page is only invisible to eviction until its next touch.
        let _ = self.cache.enqueue(tree, &page);
        Ok(id)
    }

    /// Brings the page behind `slot` into memory, reading its image through
    /// the block manager. A page already resident is returned as is.
    pub fn read_in(&self, tree_id: TreeId, slot: u32) -> Result<PageId> {
        let tree = self.tree(tree_id)?;
        let r = tree.get_ref(slot).ok_or(EvictError::PageNotFound)?;
        if let Some(page) = r.page() {
            return Ok(page.id());
        }
        let lock = RefLock::acquire_from(&r, RefState::OnDisk)?;
        let addr = r.addr().ok_or(EvictError::PageNotFound)?;
        let size = self.cache.blocks.read_page(addr).map_err(EvictError::Reconcile)?;
        self.install(&tree, lock, size, false)
    }

    /// Creates a new dirty page under `parent`.
    pub fn create_page(&self, tree_id: TreeId, parent: Option<u32>, kind: PageKind, footprint: u64) -> Result<PageId> {
        let tree = self.tree(tree_id)?;
        let flags = match kind {
            PageKind::Internal => RefFlags::INTERNAL,
            PageKind::Leaf => RefFlags::empty(),
        };
        let slot = tree.new_ref(parent, flags, None);
        let r = tree.get_ref(slot).ok_or(EvictError::PageNotFound)?;
        let lock = RefLock::acquire_from(&r, RefState::Deleted)?;
        self.install(&tree, lock, footprint, true)
    }

    /// Applies an update of `bytes` made by `session`'s transaction.
    ///
    /// Holds the reference locked for the duration, so it fails with `Busy`
    /// while eviction owns the page.
    pub fn modify_page(&self, session: &Session, id: PageId, bytes: u64) -> Result<()> {
        let (tree, r, page) = self.resolve(id)?;
        let lock = RefLock::acquire(&r)?;
        if r.page_if(id.generation).is_none() {
            return Err(EvictError::PageNotFound);
        }

        let before = page.footprint();
        page.add_footprint(bytes);
        page.add_update_bytes(bytes);
        if let Some(txn) = session.txn_id() {
            page.record_update(txn);
        }
        let first = page.set_dirty();
        for c in self.cache.byte_counters(&tree) {
            if first {
                c.mark_dirty(page.kind(), before);
            }
            c.grow(page.kind(), bytes, bytes, true);
        }
        // Requeue before unlocking so no scan finds a dirty page in a clean set.
        let queued = if first { self.cache.enqueue(&tree, &page) } else { Ok(()) };
        lock.unlock();
        queued
    }

    /// Updates the page's read generation after an access and re-queues it.
    pub fn touch_page(&self, id: PageId, wont_need: bool) -> Result<()> {
        let (tree, _, page) = self.resolve(id)?;
        let state = self.cache.state();
        let gen = page.read_gen();
        if wont_need {
            page.set_read_gen(readgen::WONT_NEED);
        } else if gen == readgen::NOTSET {
            page.set_read_gen(state.new_page_gen());
        } else if let Some(next) = readgen::bump(gen, state.read_gen()) {
            page.set_read_gen(next);
        }
        self.cache.enqueue(&tree, &page)
    }

    pub fn enqueue_page(&self, id: PageId) -> Result<()> {
        let (tree, _, page) = self.resolve(id)?;
        self.cache.enqueue(&tree, &page)
    }

    /// Unqueues the page. Returns false when it was not queued.
    pub fn remove_page(&self, id: PageId) -> Result<bool> {
        let (tree, _, page) = self.resolve(id)?;
        Ok(tree.ring().remove(&page))
    }

    /// Marks the page for eviction as soon as possible.
    pub fn mark_soon(&self, id: PageId) -> Result<()> {
        let (tree, _, page) = self.resolve(id)?;
        page.set_read_gen(readgen::OLDEST);
        self.cache.enqueue(&tree, &page)
    }

    /// Moves a page that just became dirty into its dirty bucket set.
    pub fn first_dirty(&self, id: PageId) -> Result<()> {
        let (tree, _, page) = self.resolve(id)?;
        if !page.is_dirty() {
            return Ok(());
        }
        self.cache.enqueue(&tree, &page)
    }
}
