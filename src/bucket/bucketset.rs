//! Buckets of one priority class and their read-generation ranges.
//
// Bucket 0 holds [0, bound]; bucket k holds
// [bound + range*(k-1) + 1, bound + range*k], where `bound` is the set's
// shared lowest-bucket upper bound. The bound only ever moves up.

use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::list::KeyList;
use crate::page::{readgen, PageKind};

/// Buckets per set.
pub const NUM_BUCKETS: usize = 100;
/// Read generations covered by one bucket above bucket 0.
pub const BUCKET_RANGE: u64 = 50;
/// Renumbering attempts before a page is clamped into the last bucket.
pub const RENUMBER_RETRIES: usize = 10;

/// The four priority classes, in eviction scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SetKind {
    CleanLeaf = 0,
    CleanInternal = 1,
    DirtyLeaf = 2,
    DirtyInternal = 3,
}

impl SetKind {
    pub const ALL: [SetKind; 4] = [
        SetKind::CleanLeaf,
        SetKind::CleanInternal,
        SetKind::DirtyLeaf,
        SetKind::DirtyInternal,
    ];

    pub fn classify(kind: PageKind, dirty: bool) -> Self {
        match (kind, dirty) {
            (PageKind::Leaf, false) => SetKind::CleanLeaf,
            (PageKind::Internal, false) => SetKind::CleanInternal,
            (PageKind::Leaf, true) => SetKind::DirtyLeaf,
            (PageKind::Internal, true) => SetKind::DirtyInternal,
        }
    }

    pub fn is_dirty(self) -> bool {
        matches!(self, SetKind::DirtyLeaf | SetKind::DirtyInternal)
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }
}

/// Where a page is queued; stored on the page as a non-zero `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketLoc {
    pub set: SetKind,
    pub bucket: usize,
}

impl BucketLoc {
    pub(crate) fn encode(self) -> u32 {
        1 + (self.set.index() * NUM_BUCKETS + self.bucket) as u32
    }

    pub(crate) fn decode(raw: u32) -> Option<Self> {
        if raw == 0 {
            return None;
        }
        let v = (raw - 1) as usize;
        Some(Self {
            set: SetKind::from_index(v / NUM_BUCKETS)?,
            bucket: v % NUM_BUCKETS,
        })
    }
}

pub struct Bucket {
    list: Mutex<KeyList>,
    count: AtomicUsize,
}

impl Bucket {
    fn new() -> Self {
        Self {
            list: Mutex::new(KeyList::new()),
            count: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, KeyList> {
        self.list.lock()
    }

    pub(crate) fn sync_count(&self, list: &KeyList) {
        self.count.store(list.len(), Ordering::Relaxed);
    }

    /// Keys in scan order.
    pub fn scan(&self) -> Vec<u64> {
        self.list.lock().scan()
    }
}

pub struct BucketSet {
    kind: SetKind,
    buckets: Box<[Bucket]>,
    lowest_bound: AtomicU64,
    range: u64,
}

impl BucketSet {
    pub fn new(kind: SetKind) -> Self {
        Self {
            kind,
            buckets: (0..NUM_BUCKETS).map(|_| Bucket::new()).collect(),
            lowest_bound: AtomicU64::new(readgen::WONT_NEED),
            range: BUCKET_RANGE,
        }
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn bucket(&self, idx: usize) -> &Bucket {
        &self.buckets[idx]
    }

    /// Upper bound of bucket 0.
    pub fn lowest_bound(&self) -> u64 {
        self.lowest_bound.load(Ordering::Acquire)
    }

    pub fn range(&self) -> u64 {
        self.range
    }

    /// Inclusive read-generation range of bucket `idx`.
    pub fn range_of(&self, idx: usize) -> (u64, u64) {
        let bound = self.lowest_bound();
        if idx == 0 {
            return (0, bound);
        }
        let k = idx as u64;
        (
            bound + self.range * (k - 1) + 1,
            bound + self.range * k,
        )
    }

    pub fn upper_bound(&self, idx: usize) -> u64 {
        self.range_of(idx).1
    }

    /// Bucket for `read_gen`, or `None` when it lies past the last bucket.
    pub fn bucket_index(&self, read_gen: u64) -> Option<usize> {
        let bound = self.lowest_bound();
        if read_gen <= bound {
            return Some(0);
        }
        let idx = ((read_gen - bound - 1) / self.range) as usize + 1;
        (idx < NUM_BUCKETS).then_some(idx)
    }

    /// Raises the bound so the last bucket reaches `read_gen * 1.5`.
    ///
    /// Returns false when a concurrent renumber already got there: the
    /// higher bound wins and this update is dropped.
    pub fn renumber(&self, read_gen: u64) -> bool {
        let headroom = read_gen.saturating_mul(3).saturating_add(1) / 2;
        let wanted = headroom.saturating_sub(self.range * (NUM_BUCKETS as u64 - 1));
        let mut cur = self.lowest_bound.load(Ordering::Acquire);
        while wanted > cur {
            match self.lowest_bound.compare_exchange_weak(
                cur,
                wanted,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => cur = actual,
            }
        }
        false
    }

    /// Lowest non-empty bucket.
    pub fn first_nonempty(&self) -> Option<usize> {
        self.buckets.iter().position(|b| !b.is_empty())
    }

    /// Pages queued across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.first_nonempty().is_none()
    }
}
