//! Per-tree approximate-LRU queues: four bucket sets of FIFO buckets ordered
//! by read generation.

pub mod bucketset;
pub mod list;


use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{EvictError, Result};
use crate::page::{readgen, Page};

pub use bucketset::{Bucket, BucketLoc, BucketSet, SetKind, NUM_BUCKETS, RENUMBER_RETRIES};

/// Attempts to win the page's bucket slot against concurrent enqueues.
const ENQUEUE_RETRIES: usize = 4;

/// The bucket sets of one tree.
pub struct BucketRing {
    sets: [BucketSet; 4],
}

impl BucketRing {
    pub fn new() -> Self {
        Self {
            sets: SetKind::ALL.map(BucketSet::new),
        }
    }

    pub fn set(&self, kind: SetKind) -> &BucketSet {
        &self.sets[kind.index()]
    }

    /// Pages queued in every set.
    pub fn len(&self) -> usize {
        self.sets.iter().map(BucketSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.iter().all(BucketSet::is_empty)
    }

    /// Computes the bucket `page` belongs in and moves it there.
    ///
    /// A page already in the right bucket stays put, except that an
    /// "evict soon" page is moved to the scan end of bucket 0.
    pub fn enqueue(&self, page: &Page) -> Result<BucketLoc> {
        let kind = SetKind::classify(page.kind(), page.is_dirty());
        let set = self.set(kind);
        let gen = page.read_gen();

        let mut idx = None;
        for _ in 0..RENUMBER_RETRIES {
            if let Some(i) = set.bucket_index(gen) {
                idx = Some(i);
                break;
            }
            set.renumber(gen);
        }
        let dest = BucketLoc {
            set: kind,
            bucket: idx.unwrap_or(NUM_BUCKETS - 1),
        };
        let soon = readgen::is_evict_soon(gen);
        let key = page.id().key();

        for _ in 0..ENQUEUE_RETRIES {
            let cur = BucketLoc::decode(page.bucket.load(Ordering::Acquire));
            if cur == Some(dest) {
                if soon {
                    let bucket = set.bucket(dest.bucket);
                    let mut list = bucket.lock();
                    if page.bucket.load(Ordering::Acquire) == dest.encode() {
                        list.push_back(key).map_err(|_| EvictError::OutOfMemory)?;
                    }
                }
                return Ok(dest);
            }
            if let Some(cur) = cur {
                self.remove_at(page, cur);
            }

            let bucket = set.bucket(dest.bucket);
            let mut list = bucket.lock();
            if page
                .bucket
                .compare_exchange(0, dest.encode(), Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            let pushed = if soon {
                list.push_back(key)
            } else {
                list.push_front(key)
            };
            if pushed.is_err() {
                page.bucket.store(0, Ordering::Release);
                warn!(
                    component = "bucket",
                    event = "enqueue_lost",
                    slot = page.id().slot,
                    "bucket allocation failed, page left unqueued"
                );
                return Err(EvictError::OutOfMemory);
            }
            bucket.sync_count(&list);
            return Ok(dest);
        }
        Err(EvictError::Busy)
    }

    /// Unlinks `page` from whatever bucket holds it. A page that is not
    /// queued is left alone, so calling this twice is harmless.
    pub fn remove(&self, page: &Page) -> bool {
        for _ in 0..ENQUEUE_RETRIES {
            match BucketLoc::decode(page.bucket.load(Ordering::Acquire)) {
                None => return false,
                Some(loc) => {
                    if self.remove_at(page, loc) {
                        return true;
                    }
                }
            }
        }
        false
    }

    fn remove_at(&self, page: &Page, loc: BucketLoc) -> bool {
        let bucket = self.set(loc.set).bucket(loc.bucket);
        let mut list = bucket.lock();
        if page
            .bucket
            .compare_exchange(loc.encode(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        list.remove(page.id().key());
        bucket.sync_count(&list);
        true
    }

    /// Drops a key whose page no longer exists.
    pub(crate) fn remove_stale(&self, loc: BucketLoc, key: u64) {
        let bucket = self.set(loc.set).bucket(loc.bucket);
        let mut list = bucket.lock();
        if list.remove(key) {
            bucket.sync_count(&list);
        }
    }

    /// Checks that the page at `loc` belongs there.
    pub fn check_placement(&self, page: &Page, loc: BucketLoc) -> Result<()> {
        let kind = SetKind::classify(page.kind(), page.is_dirty());
        if kind != loc.set {
            return Err(EvictError::Consistency(format!(
                "page slot {} is {:?} but queued in {:?}",
                page.id().slot,
                kind,
                loc.set
            )));
        }
        let gen = page.read_gen();
        let (_, hi) = self.set(loc.set).range_of(loc.bucket);
        if gen > hi && loc.bucket != NUM_BUCKETS - 1 {
            return Err(EvictError::Consistency(format!(
                "page slot {} read_gen {} above bucket {} bound {}",
                page.id().slot,
                gen,
                loc.bucket,
                hi
            )));
        }
        Ok(())
    }

    /// Walks every bucket and checks each resident page's placement.
    ///
    /// `lookup` resolves a key to its live page; keys without one are stale
    /// and skipped.
    pub fn verify<F>(&self, lookup: F) -> Result<()>
    where
        F: Fn(u64) -> Option<Arc<Page>>,
    {
        for set in &self.sets {
            for idx in 0..NUM_BUCKETS {
                let loc = BucketLoc {
                    set: set.kind(),
                    bucket: idx,
                };
                for key in set.bucket(idx).scan() {
                    let Some(page) = lookup(key) else {
                        continue;
                    };
                    if page.bucket.load(Ordering::Acquire) != loc.encode() {
                        let err = EvictError::Consistency(format!(
                            "page slot {} listed in {:?}/{} but points elsewhere",
                            page.id().slot,
                            loc.set,
                            idx
                        ));
                        error!(component = "bucket", event = "verify_failed", error = %err);
                        return Err(err);
                    }
                    if let Err(err) = self.check_placement(&page, loc) {
                        error!(component = "bucket", event = "verify_failed", error = %err);
                        return Err(err);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for BucketRing {
    fn default() -> Self {
        Self::new()
    }
}
