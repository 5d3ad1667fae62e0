//! Engine handle: owns the cache state and the worker pool and is passed
//! explicitly to every eviction entry point.

pub mod pages;

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{BlockManager, Reconciler};
use crate::backoff::{Backoff, SpinThenSleep};
use crate::error::{EvictError, Result};
use crate::evict::{Cache, EvictFlags, EvictionSettings};
use crate::page::{RefFlags, RefLock, RefState};
use crate::tree::{BytesSnapshot, Tree, TreeId};
use crate::txn::{Session, TxnGlobal};
use crate::workers::Evictor;

/// Point-in-time view of the eviction engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineStats {
    pub bytes: BytesSnapshot,
    pub flags: EvictFlags,
    pub progress: u64,
    pub aggressive_score: u32,
    pub read_gen: u64,
    pub workers: usize,
    pub trees: usize,
}

pub struct Engine {
    cache: Arc<Cache>,
    evictor: Arc<Evictor>,
}

impl Engine {
    /// Builds the engine from resolved settings. Nothing runs until `start`.
    pub fn configure(
        settings: EvictionSettings,
        reconciler: Arc<dyn Reconciler>,
        blocks: Arc<dyn BlockManager>,
    ) -> Result<Self> {
        settings.validate()?;
        let txn = Arc::new(TxnGlobal::new());
        let cache = Arc::new(Cache::new(settings, txn, reconciler, blocks));
        let evictor = Evictor::new("evictor".to_string(), cache.clone());
        Ok(Self { cache, evictor })
    }

    pub fn start(&self) -> Result<()> {
        self.evictor.start()
    }

    /// Stops the worker pool; a no-op when it never started.
    pub fn stop(&self) {
        self.evictor.stop();
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    pub fn txn(&self) -> &TxnGlobal {
        self.cache.txn()
    }

    pub fn settings(&self) -> &EvictionSettings {
        self.cache.settings()
    }

    pub fn stats(&self) -> EngineStats {
        let state = self.cache.state();
        EngineStats {
            bytes: self.cache.bytes(),
            flags: state.flags(),
            progress: state.progress(),
            aggressive_score: state.aggressive_score(),
            read_gen: state.read_gen(),
            workers: self.evictor.replicas(),
            trees: self.cache.trees().len(),
        }
    }

    /// Opens a tree with an empty root at slot 0.
    pub fn open_tree(&self, name: &str, metadata: bool) -> Arc<Tree> {
        let tree = self.cache.trees().open(name, metadata);
        tree.new_ref(None, RefFlags::INTERNAL, None);
        info!(
            component = "engine",
            event = "tree_opened",
            tree = name,
            index = tree.id().index
        );
        tree
    }

    pub fn tree(&self, id: TreeId) -> Result<Arc<Tree>> {
        self.cache.trees().get(id).ok_or(EvictError::TreeNotFound)
    }

    /// Marks a tree as pending close; eviction prefers it and discards its
    /// pages without writing them.
    pub fn mark_tree_dead(&self, id: TreeId) -> Result<()> {
        self.tree(id)?.mark_dead();
        self.cache.wake.notify_all();
        Ok(())
    }

    /// Discards every resident page of the tree and removes it.
    pub fn close_tree(&self, id: TreeId) -> Result<()> {
        let tree = self.tree(id)?;
        self.disable_eviction(id)?;

        let mut discarded = 0u64;
        for r in tree.resident_refs() {
            let mut backoff = SpinThenSleep::default();
            let mut attempt = 0;
            let lock = loop {
                match RefLock::acquire(&r) {
                    Ok(lock) => break Some(lock),
                    Err(_) if r.state() != RefState::Locked => break None,
                    Err(_) => {
                        if !backoff.pause(attempt) {
                            self.enable_eviction(id)?;
                            return Err(EvictError::Busy);
                        }
                        attempt += 1;
                    }
                }
            };
            let Some(lock) = lock else { continue };
            let Some(page) = r.page() else { continue };
            tree.ring().remove(&page);
            discarded += self.cache.discard(&tree, lock, &page);
        }

        self.cache.trees().remove(id);
        info!(
            component = "engine",
            event = "tree_closed",
            tree = tree.name(),
            discarded_bytes = discarded
        );
        Ok(())
    }

    pub fn set_tree_priority(&self, id: TreeId, priority: u64) -> Result<()> {
        self.tree(id)?.set_priority(priority);
        Ok(())
    }

    pub fn set_checkpointing(&self, id: TreeId, on: bool) -> Result<()> {
        self.tree(id)?.set_checkpointing(on);
        Ok(())
    }

    /// Stops eviction from touching the tree. The first caller waits for
    /// in-flight evictions in the tree to finish.
    pub fn disable_eviction(&self, id: TreeId) -> Result<()> {
        self.disable_eviction_with(id, &mut SpinThenSleep::default())
    }

    pub fn disable_eviction_with<B: Backoff>(&self, id: TreeId, backoff: &mut B) -> Result<()> {
        let tree = self.tree(id)?;
        if tree.disable() > 1 {
            return Ok(());
        }
        let mut attempt = 0;
        while tree.busy() > 0 {
            if !backoff.pause(attempt) {
                let _ = tree.enable();
                warn!(
                    component = "engine",
                    event = "disable_eviction_timeout",
                    tree = tree.name(),
                    busy = tree.busy()
                );
                return Err(EvictError::Busy);
            }
            attempt += 1;
        }
        debug!(component = "engine", event = "eviction_disabled", tree = tree.name());
        Ok(())
    }

    pub fn enable_eviction(&self, id: TreeId) -> Result<()> {
        let tree = self.tree(id)?;
        match tree.enable() {
            Some(0) => {
                debug!(component = "engine", event = "eviction_enabled", tree = tree.name());
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                warn!(component = "engine", event = "unbalanced_enable", tree = tree.name());
                Err(EvictError::Consistency(format!(
                    "eviction enabled on tree {} more often than disabled",
                    tree.name()
                )))
            }
        }
    }

    /// Called before an operation grows the cache.
    pub fn assist_if_needed(&self, session: &Session, busy: bool, readonly: bool) -> Result<()> {
        self.cache.assist_if_needed(session, busy, readonly)
    }

    /// Runs one eviction attempt the way a worker iteration does.
    pub fn evict_one(&self, session: &mut Session) -> Result<u64> {
        session.refresh(self.cache.txn());
        let flags = self.cache.update_flags();
        if !flags.needed() {
            return Err(EvictError::NotFound);
        }
        self.cache.evict_one(session, flags)
    }

    pub fn verify_buckets(&self, id: TreeId) -> Result<()> {
        let tree = self.tree(id)?;
        self.cache.verify_buckets(&tree)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.evictor.stop();
    }
}
