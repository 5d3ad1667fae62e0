//! Open trees and their eviction data.

pub mod bytes;

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::BlockAddr;
use crate::bucket::BucketRing;
use crate::page::{key_generation, key_slot, Page, Ref, RefFlags};

pub use bytes::{ByteCounters, BytesSnapshot};

/// Index into the tree table plus the generation of the tree in that slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId {
    pub index: u32,
    pub generation: u32,
}

/// One open tree: its references and per-tree eviction state.
pub struct Tree {
    id: TreeId,
    name: String,
    metadata: bool,
    refs: RwLock<Vec<Arc<Ref>>>,
    ring: BucketRing,
    bytes: ByteCounters,
    disabled: AtomicI32,
    busy: AtomicU32,
    priority: AtomicU64,
    checkpointing: AtomicBool,
    dead: AtomicBool,
}

impl Tree {
    fn new(id: TreeId, name: String, metadata: bool) -> Self {
        Self {
            id,
            name,
            metadata,
            refs: RwLock::new(Vec::with_capacity(256)),
            ring: BucketRing::new(),
            bytes: ByteCounters::new(),
            disabled: AtomicI32::new(0),
            busy: AtomicU32::new(0),
            priority: AtomicU64::new(0),
            checkpointing: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TreeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_metadata(&self) -> bool {
        self.metadata
    }

    pub fn ring(&self) -> &BucketRing {
        &self.ring
    }

    pub fn bytes(&self) -> &ByteCounters {
        &self.bytes
    }

    /// Adds a reference slot. Slot 0 of every tree is its root.
    pub fn new_ref(&self, parent: Option<u32>, flags: RefFlags, addr: Option<BlockAddr>) -> u32 {
        let mut refs = self.refs.write();
        let slot = refs.len() as u32;
        let flags = if slot == 0 { flags | RefFlags::ROOT } else { flags };
        refs.push(Arc::new(Ref::new(slot, parent, flags, addr)));
        slot
    }

    pub fn get_ref(&self, slot: u32) -> Option<Arc<Ref>> {
        self.refs.read().get(slot as usize).cloned()
    }

    /// Resolves a bucket key to its reference and live page.
    pub fn resolve(&self, key: u64) -> Option<(Arc<Ref>, Arc<Page>)> {
        let r = self.get_ref(key_slot(key))?;
        let page = r.page_if(key_generation(key))?;
        Some((r, page))
    }

    /// References with a resident page.
    pub fn resident_refs(&self) -> Vec<Arc<Ref>> {
        self.refs
            .read()
            .iter()
            .filter(|r| r.page().is_some())
            .cloned()
            .collect()
    }

    pub fn ref_count(&self) -> usize {
        self.refs.read().len()
    }

    pub fn disabled(&self) -> i32 {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Increments the eviction-disabled count, returning the new value.
    pub(crate) fn disable(&self) -> i32 {
        self.disabled.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the eviction-disabled count, returning the new value, or
    /// `None` when the count is already zero.
    pub(crate) fn enable(&self) -> Option<i32> {
        self.disabled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > 0).then(|| n - 1))
            .ok()
            .map(|prev| prev - 1)
    }

    /// Evictions currently running against this tree.
    pub fn busy(&self) -> u32 {
        self.busy.load(Ordering::SeqCst)
    }

    /// Registers an in-flight eviction. Fails when eviction was disabled in
    /// the meantime.
    pub(crate) fn enter_evict(&self) -> bool {
        self.busy.fetch_add(1, Ordering::SeqCst);
        if self.disabled.load(Ordering::SeqCst) > 0 {
            self.busy.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    pub(crate) fn leave_evict(&self) {
        self.busy.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn priority(&self) -> u64 {
        self.priority.load(Ordering::Relaxed)
    }

    pub(crate) fn set_priority(&self, v: u64) {
        self.priority.store(v, Ordering::Relaxed);
    }

    pub fn is_checkpointing(&self) -> bool {
        self.checkpointing.load(Ordering::Acquire)
    }

    pub fn set_checkpointing(&self, v: bool) {
        self.checkpointing.store(v, Ordering::Release);
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }
}

struct TreeSlot {
    generation: u32,
    tree: Option<Arc<Tree>>,
}

/// Table of open trees indexed by `TreeId`.
///
/// Selection scans under the read lock; opening and closing take it
/// exclusively.
pub struct TreeTable {
    slots: RwLock<Vec<TreeSlot>>,
    cursor: AtomicUsize,
}

impl TreeTable {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Vec::with_capacity(16)),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn open(&self, name: &str, metadata: bool) -> Arc<Tree> {
        let mut slots = self.slots.write();
        let free = slots.iter().position(|s| s.tree.is_none());
        let (index, generation) = match free {
            Some(i) => (i, slots[i].generation.wrapping_add(1)),
            None => {
                slots.push(TreeSlot {
                    generation: 0,
                    tree: None,
                });
                (slots.len() - 1, 0)
            }
        };
        let id = TreeId {
            index: index as u32,
            generation,
        };
        let tree = Arc::new(Tree::new(id, name.to_string(), metadata));
        slots[index] = TreeSlot {
            generation,
            tree: Some(tree.clone()),
        };
        tree
    }

    pub fn get(&self, id: TreeId) -> Option<Arc<Tree>> {
        let slots = self.slots.read();
        let slot = slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.tree.clone()
    }

    pub fn remove(&self, id: TreeId) -> Option<Arc<Tree>> {
        let mut slots = self.slots.write();
        let slot = slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.tree.take()
    }

    /// Runs `f` over the open trees under the read lock, starting at a
    /// rotating position so consecutive scans spread across trees.
    pub fn scan<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Tree>) -> bool,
    {
        let slots = self.slots.read();
        let n = slots.len();
        if n == 0 {
            return;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
        for i in 0..n {
            if let Some(tree) = &slots[(start + i) % n].tree {
                if !f(tree) {
                    return;
                }
            }
        }
    }

    pub fn all(&self) -> Vec<Arc<Tree>> {
        self.slots
            .read()
            .iter()
            .filter_map(|s| s.tree.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.read().iter().filter(|s| s.tree.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TreeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reopened_slot_invalidates_old_id() {
        let table = TreeTable::new();
        let a = table.open("a", false);
        let id = a.id();
        assert!(table.remove(id).is_some());
        let b = table.open("b", false);
        assert_eq!(b.id().index, id.index);
        assert!(table.get(id).is_none());
        assert!(table.get(b.id()).is_some());
    }

    #[test]
    fn test_first_ref_is_root() {
        let table = TreeTable::new();
        let t = table.open("t", false);
        let root = t.new_ref(None, RefFlags::INTERNAL, None);
        let leaf = t.new_ref(Some(root), RefFlags::empty(), Some(BlockAddr(5)));
        assert!(t.get_ref(root).unwrap().is_root());
        assert!(!t.get_ref(leaf).unwrap().is_root());
    }

    #[test]
    fn test_enter_evict_refused_while_disabled() {
        let table = TreeTable::new();
        let t = table.open("t", false);
        assert_eq!(t.disable(), 1);
        assert!(!t.enter_evict());
        assert_eq!(t.busy(), 0);
        assert_eq!(t.enable(), Some(0));
        assert!(t.enter_evict());
        t.leave_evict();
    }

    #[test]
    fn test_enable_never_goes_below_zero() {
        let table = TreeTable::new();
        let t = table.open("t", false);
        assert_eq!(t.enable(), None);
        assert_eq!(t.disabled(), 0);
        assert_eq!(t.disable(), 1);
        assert!(!t.enter_evict());
    }
}
