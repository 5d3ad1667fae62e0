//! Choosing which tree, then which page, to evict next.

use std::sync::Arc;
use tracing::trace;

use super::policy::EvictFlags;
use super::Cache;
use crate::bucket::{BucketLoc, SetKind, NUM_BUCKETS};
use crate::page::{Page, Ref, RefLock};
use crate::tree::Tree;
use crate::txn::{Session, TXN_NONE};

/// Share of a target a single tree must hold to count as dominating.
const DOMINATING_SHARE: f64 = 0.5;

/// Upper bound of the first non-empty bucket across `sets`, in scan order.
fn oldest_bound(tree: &Tree, sets: &[SetKind]) -> Option<u64> {
    sets.iter().find_map(|&kind| {
        let set = tree.ring().set(kind);
        set.first_nonempty().map(|idx| set.upper_bound(idx))
    })
}

impl Cache {
    /// Whether one tree alone holds at least half of a class budget.
    fn dominates(&self, tree: &Tree) -> bool {
        let size = self.settings.cache_size as f64;
        let t = &self.settings.targets;
        let b = tree.bytes().snapshot();
        let over = |bytes: u64, target: f64| bytes as f64 >= size * target / 100.0 * DOMINATING_SHARE;
        over(b.inmem, t.clean) || over(b.dirty, t.dirty) || over(b.updates, t.updates)
    }

    /// Trees eligible for eviction, best candidate first.
    ///
    /// Dead trees with queued pages come first. The rest are ordered by the
    /// upper bound of their oldest non-empty bucket.
    pub(crate) fn candidate_trees(&self, flags: EvictFlags) -> Vec<Arc<Tree>> {
        let aggressive = self.state.is_aggressive();
        let sets = flags.sets();
        let mut dead = Vec::new();
        let mut ranked: Vec<(u64, Arc<Tree>)> = Vec::new();

        self.trees.scan(|tree| {
            if tree.disabled() > 0 {
                return true;
            }
            if tree.is_dead() {
                if !tree.ring().is_empty() {
                    dead.push(tree.clone());
                }
                return true;
            }
            if tree.is_checkpointing() && !flags.clean_or_updates_only() {
                return true;
            }
            if tree.priority() != 0 && !aggressive && !self.dominates(tree) {
                return true;
            }
            if let Some(bound) = oldest_bound(tree, sets) {
                ranked.push((bound, tree.clone()));
            }
            true
        });

        ranked.sort_by_key(|(bound, _)| *bound);
        dead.extend(ranked.into_iter().map(|(_, tree)| tree));
        dead
    }

    /// The tree the next eviction should come from.
    pub fn choose_tree(&self, flags: EvictFlags) -> Option<Arc<Tree>> {
        self.candidate_trees(flags).into_iter().next()
    }

    /// Scans `tree`'s buckets for the first page that can be evicted and
    /// returns it locked.
    pub fn choose_page(
        &self,
        tree: &Tree,
        flags: EvictFlags,
        session: &Session,
    ) -> Option<(RefLock, Arc<Page>)> {
        let dead = tree.is_dead();
        let sets: &[SetKind] = if dead { &SetKind::ALL } else { flags.sets() };

        for &kind in sets {
            let set = tree.ring().set(kind);
            for idx in 0..NUM_BUCKETS {
                let bucket = set.bucket(idx);
                if bucket.is_empty() {
                    continue;
                }
                let loc = BucketLoc { set: kind, bucket: idx };
                for key in bucket.scan() {
                    let Some((r, page)) = tree.resolve(key) else {
                        tree.ring().remove_stale(loc, key);
                        continue;
                    };
                    let Ok(lock) = RefLock::acquire(&r) else {
                        continue;
                    };
                    // The slot may have been refilled between the lookup and the lock.
                    if r.page_if(page.id().generation).is_none() {
                        continue;
                    }
                    // Dirtied after the scan; it is queued in its dirty set now.
                    if SetKind::classify(page.kind(), page.is_dirty()) != kind {
                        continue;
                    }
                    if dead {
                        return Some((lock, page));
                    }
                    match self.skip_reason(tree, &r, &page, flags, session) {
                        None => return Some((lock, page)),
                        Some(reason) => {
                            trace!(
                                component = "evictor",
                                event = "page_skipped",
                                tree = tree.name(),
                                slot = r.slot(),
                                reason
                            );
                        }
                    }
                }
            }
        }
        None
    }

    /// Why the locked page must stay, or `None` when it can go.
    fn skip_reason(
        &self,
        tree: &Tree,
        r: &Ref,
        page: &Page,
        flags: EvictFlags,
        session: &Session,
    ) -> Option<&'static str> {
        let dirty = page.is_dirty();
        if dirty && tree.is_checkpointing() {
            return Some("checkpoint");
        }

        let oldest = self.txn.oldest();
        if page.evict_retry() != 0 && page.evict_retry() == oldest {
            return Some("retry");
        }

        if dirty {
            let newest = page.newest_txn();
            if flags.intersects(EvictFlags::DIRTY_HARD | EvictFlags::UPDATES_HARD) {
                if !session.visible(newest) {
                    return Some("invisible");
                }
            } else if newest != TXN_NONE && newest >= oldest {
                page.set_evict_retry(oldest);
                return Some("too_new");
            }
        }

        if page.is_internal() && page.resident_children() > 0 {
            return Some("children");
        }
        if tree.is_metadata() && !dirty && page.history_pinned() {
            return Some("history");
        }
        if r.is_root() || page.is_splitting() {
            return Some("not_evictable");
        }
        None
    }
}
