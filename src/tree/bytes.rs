//! Cache byte counters.
//
// Counters are updated with relaxed atomics and no global lock, so readers
// may see a few operations of staleness. Values are signed and clamped at
// zero on read to tolerate transient underflow from racing updates.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::page::PageKind;

#[derive(Debug, Default)]
pub struct ByteCounters {
    inmem: AtomicI64,
    dirty_leaf: AtomicI64,
    dirty_intl: AtomicI64,
    updates: AtomicI64,
    pages: AtomicI64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BytesSnapshot {
    pub inmem: u64,
    pub dirty: u64,
    pub updates: u64,
    pub pages: u64,
}

fn clamp(v: i64) -> u64 {
    v.max(0) as u64
}

impl ByteCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inmem(&self) -> u64 {
        clamp(self.inmem.load(Ordering::Relaxed))
    }

    pub fn dirty(&self) -> u64 {
        clamp(self.dirty_leaf.load(Ordering::Relaxed) + self.dirty_intl.load(Ordering::Relaxed))
    }

    pub fn updates(&self) -> u64 {
        clamp(self.updates.load(Ordering::Relaxed))
    }

    pub fn pages(&self) -> u64 {
        clamp(self.pages.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> BytesSnapshot {
        BytesSnapshot {
            inmem: self.inmem(),
            dirty: self.dirty(),
            updates: self.updates(),
            pages: self.pages(),
        }
    }

    fn dirty_counter(&self, kind: PageKind) -> &AtomicI64 {
        match kind {
            PageKind::Leaf => &self.dirty_leaf,
            PageKind::Internal => &self.dirty_intl,
        }
    }

    /// A page entered memory.
    pub fn page_in(&self, kind: PageKind, bytes: u64, dirty: bool) {
        self.inmem.fetch_add(bytes as i64, Ordering::Relaxed);
        self.pages.fetch_add(1, Ordering::Relaxed);
        if dirty {
            self.dirty_counter(kind).fetch_add(bytes as i64, Ordering::Relaxed);
        }
    }

    /// A page left memory.
    pub fn page_out(&self, kind: PageKind, bytes: u64, dirty: bool, updates: u64) {
        self.inmem.fetch_sub(bytes as i64, Ordering::Relaxed);
        self.pages.fetch_sub(1, Ordering::Relaxed);
        if dirty {
            self.dirty_counter(kind).fetch_sub(bytes as i64, Ordering::Relaxed);
        }
        self.updates.fetch_sub(updates as i64, Ordering::Relaxed);
    }

    /// A resident page grew by `bytes`, `updates` of which are update data.
    pub fn grow(&self, kind: PageKind, bytes: u64, updates: u64, dirty: bool) {
        self.inmem.fetch_add(bytes as i64, Ordering::Relaxed);
        if dirty {
            self.dirty_counter(kind).fetch_add(bytes as i64, Ordering::Relaxed);
        }
        self.updates.fetch_add(updates as i64, Ordering::Relaxed);
    }

    pub fn mark_dirty(&self, kind: PageKind, bytes: u64) {
        self.dirty_counter(kind).fetch_add(bytes as i64, Ordering::Relaxed);
    }

    /// A dirty page was written; its update bytes are no longer pending.
    pub fn mark_clean(&self, kind: PageKind, bytes: u64, updates: u64) {
        self.dirty_counter(kind).fetch_sub(bytes as i64, Ordering::Relaxed);
        self.updates.fetch_sub(updates as i64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_lifecycle_returns_to_zero() {
        let c = ByteCounters::new();
        c.page_in(PageKind::Leaf, 100, false);
        c.mark_dirty(PageKind::Leaf, 100);
        c.grow(PageKind::Leaf, 20, 20, true);
        assert_eq!(c.snapshot(), BytesSnapshot { inmem: 120, dirty: 120, updates: 20, pages: 1 });
        c.mark_clean(PageKind::Leaf, 120, 20);
        c.page_out(PageKind::Leaf, 120, false, 0);
        assert_eq!(c.snapshot(), BytesSnapshot::default());
    }

    #[test]
    fn test_underflow_reads_as_zero() {
        let c = ByteCounters::new();
        c.page_out(PageKind::Internal, 10, true, 5);
        assert_eq!(c.inmem(), 0);
        assert_eq!(c.dirty(), 0);
        assert_eq!(c.updates(), 0);
    }
}
