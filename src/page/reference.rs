//! Tree slot pointing at a resident page or an on-disk address.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use super::state::{RefFlags, RefState, StateWord};
use super::Page;
use crate::backend::BlockAddr;

const NO_ADDR: u64 = 0;

pub struct Ref {
    slot: u32,
    parent: Option<u32>,
    state: StateWord,
    page: ArcSwapOption<Page>,
    addr: AtomicU64,
    page_gen: AtomicU32,
}

impl Ref {
    pub(crate) fn new(slot: u32, parent: Option<u32>, flags: RefFlags, addr: Option<BlockAddr>) -> Self {
        let state = if addr.is_some() {
            RefState::OnDisk
        } else {
            RefState::Deleted
        };
        Self {
            slot,
            parent,
            state: StateWord::new(state, flags),
            page: ArcSwapOption::empty(),
            addr: AtomicU64::new(addr.map_or(NO_ADDR, |a| a.0)),
            page_gen: AtomicU32::new(0),
        }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn parent(&self) -> Option<u32> {
        self.parent
    }

    pub fn state(&self) -> RefState {
        self.state.state()
    }

    pub fn flags(&self) -> RefFlags {
        self.state.flags()
    }

    pub fn is_root(&self) -> bool {
        self.flags().contains(RefFlags::ROOT)
    }

    pub(crate) fn state_word(&self) -> &StateWord {
        &self.state
    }

    /// The resident page, if any.
    pub fn page(&self) -> Option<Arc<Page>> {
        self.page.load_full()
    }

    /// The resident page when it is the instance `generation`.
    pub fn page_if(&self, generation: u32) -> Option<Arc<Page>> {
        self.page()
            .filter(|p| p.id().generation == generation)
    }

    pub(crate) fn install(&self, page: Arc<Page>) {
        self.page.store(Some(page));
    }

    pub(crate) fn discard(&self) -> Option<Arc<Page>> {
        self.page.swap(None)
    }

    pub(crate) fn next_generation(&self) -> u32 {
        self.page_gen.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    pub fn addr(&self) -> Option<BlockAddr> {
        match self.addr.load(Ordering::Acquire) {
            NO_ADDR => None,
            a => Some(BlockAddr(a)),
        }
    }

    pub(crate) fn set_addr(&self, addr: Option<BlockAddr>) -> Option<BlockAddr> {
        match self.addr.swap(addr.map_or(NO_ADDR, |a| a.0), Ordering::AcqRel) {
            NO_ADDR => None,
            a => Some(BlockAddr(a)),
        }
    }
}
