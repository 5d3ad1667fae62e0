//! Counters for eviction statistics.
//

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for eviction statistics. Reset by every stats report.
#[derive(Debug, Default)]
pub struct Counters {
    pub evicted_pages: AtomicU64,
    pub evicted_bytes: AtomicU64,
    /// Dirty pages written and kept resident.
    pub scrubbed_pages: AtomicU64,
    pub reconcile_failures: AtomicU64,
    pub app_evicted: AtomicU64,
    /// Application threads that waited for candidates.
    pub app_waits: AtomicU64,
    pub rollbacks: AtomicU64,
    pub not_found: AtomicU64,
    pub lost_enqueues: AtomicU64,
}

/// Values taken by `Counters::reset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub evicted_pages: u64,
    pub evicted_bytes: u64,
    pub scrubbed_pages: u64,
    pub reconcile_failures: u64,
    pub app_evicted: u64,
    pub app_waits: u64,
    pub rollbacks: u64,
    pub not_found: u64,
    pub lost_enqueues: u64,
}

impl Counters {
    /// Creates a new counters instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Resets all counters and returns their previous values.
    pub fn reset(&self) -> CountersSnapshot {
        CountersSnapshot {
            evicted_pages: self.evicted_pages.swap(0, Ordering::Relaxed),
            evicted_bytes: self.evicted_bytes.swap(0, Ordering::Relaxed),
            scrubbed_pages: self.scrubbed_pages.swap(0, Ordering::Relaxed),
            reconcile_failures: self.reconcile_failures.swap(0, Ordering::Relaxed),
            app_evicted: self.app_evicted.swap(0, Ordering::Relaxed),
            app_waits: self.app_waits.swap(0, Ordering::Relaxed),
            rollbacks: self.rollbacks.swap(0, Ordering::Relaxed),
            not_found: self.not_found.swap(0, Ordering::Relaxed),
            lost_enqueues: self.lost_enqueues.swap(0, Ordering::Relaxed),
        }
    }
}
