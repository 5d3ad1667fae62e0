//! Cached pages and the references that own them.

pub mod readgen;
pub mod reference;
pub mod state;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

pub use reference::Ref;
pub use state::{RefFlags, RefLock, RefState};

use crate::tree::TreeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Leaf,
    Internal,
}

/// Handle to one resident page instance: tree, reference slot and the
/// generation of the page installed in that slot. A handle to a page that
/// has since been evicted (or replaced) fails validation on dereference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub tree: TreeId,
    pub slot: u32,
    pub generation: u32,
}

impl PageId {
    /// Key identifying the page inside its tree's buckets.
    pub fn key(&self) -> u64 {
        page_key(self.slot, self.generation)
    }
}

pub(crate) fn page_key(slot: u32, generation: u32) -> u64 {
    ((slot as u64) << 32) | generation as u64
}

pub(crate) fn key_slot(key: u64) -> u32 {
    (key >> 32) as u32
}

pub(crate) fn key_generation(key: u64) -> u32 {
    key as u32
}

/// A resident cache entry.
///
/// Everything eviction reads is atomic: other threads may touch the read
/// generation while the evicting thread holds the reference locked.
pub struct Page {
    id: PageId,
    kind: PageKind,
    footprint: AtomicU64,
    update_bytes: AtomicU64,
    dirty: AtomicBool,
    read_gen: AtomicU64,
    /// Encoded bucket location, 0 when not queued.
    pub(crate) bucket: AtomicU32,
    newest_txn: AtomicU64,
    /// Oldest transaction id observed when eviction last gave up on the page.
    evict_retry: AtomicU64,
    resident_children: AtomicU32,
    history_pinned: AtomicBool,
    splitting: AtomicBool,
}

impl Page {
    pub(crate) fn new(id: PageId, kind: PageKind, footprint: u64, dirty: bool) -> Self {
        Self {
            id,
            kind,
            footprint: AtomicU64::new(footprint),
            update_bytes: AtomicU64::new(0),
            dirty: AtomicBool::new(dirty),
            read_gen: AtomicU64::new(readgen::NOTSET),
            bucket: AtomicU32::new(0),
            newest_txn: AtomicU64::new(0),
            evict_retry: AtomicU64::new(0),
            resident_children: AtomicU32::new(0),
            history_pinned: AtomicBool::new(false),
            splitting: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> PageId {
        self.id
    }

    pub fn kind(&self) -> PageKind {
        self.kind
    }

    pub fn is_internal(&self) -> bool {
        self.kind == PageKind::Internal
    }

    /// Memory footprint in bytes.
    pub fn footprint(&self) -> u64 {
        self.footprint.load(Ordering::Relaxed)
    }

    pub(crate) fn add_footprint(&self, delta: u64) {
        self.footprint.fetch_add(delta, Ordering::Relaxed);
    }

    /// Bytes of the footprint held by not-yet-reconciled updates.
    pub fn update_bytes(&self) -> u64 {
        self.update_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn add_update_bytes(&self, delta: u64) {
        self.update_bytes.fetch_add(delta, Ordering::Relaxed);
    }

    pub(crate) fn take_update_bytes(&self) -> u64 {
        self.update_bytes.swap(0, Ordering::Relaxed)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Sets the dirty flag, returning true on the clean -> dirty transition.
    pub(crate) fn set_dirty(&self) -> bool {
        self.dirty
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clears the dirty flag, returning true on the dirty -> clean transition.
    pub(crate) fn set_clean(&self) -> bool {
        self.dirty
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn read_gen(&self) -> u64 {
        self.read_gen.load(Ordering::Acquire)
    }

    pub(crate) fn set_read_gen(&self, gen: u64) {
        self.read_gen.store(gen, Ordering::Release);
    }

    /// Transaction id of the newest update on the page.
    pub fn newest_txn(&self) -> u64 {
        self.newest_txn.load(Ordering::Acquire)
    }

    pub(crate) fn record_update(&self, txn: u64) {
        self.newest_txn.fetch_max(txn, Ordering::AcqRel);
    }

    pub(crate) fn evict_retry(&self) -> u64 {
        self.evict_retry.load(Ordering::Relaxed)
    }

    pub(crate) fn set_evict_retry(&self, oldest_txn: u64) {
        self.evict_retry.store(oldest_txn, Ordering::Relaxed);
    }

    pub fn resident_children(&self) -> u32 {
        self.resident_children.load(Ordering::Acquire)
    }

    pub(crate) fn child_in(&self) {
        self.resident_children.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn child_out(&self) {
        let _ = self
            .resident_children
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Metadata page holding history some reader still needs.
    pub fn history_pinned(&self) -> bool {
        self.history_pinned.load(Ordering::Acquire)
    }

    pub fn set_history_pinned(&self, pinned: bool) {
        self.history_pinned.store(pinned, Ordering::Release);
    }

    pub fn is_splitting(&self) -> bool {
        self.splitting.load(Ordering::Acquire)
    }

    pub fn set_splitting(&self, splitting: bool) {
        self.splitting.store(splitting, Ordering::Release);
    }
}
