//! Reference state word and the lock-free transitions eviction relies on.
//
// The state and its flags share one atomic word: the low byte is the state,
// the rest are `RefFlags`. Every transition is a compare-and-swap on the
// whole word, so restoring a locked reference puts the flags back as well.

use bitflags::bitflags;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::reference::Ref;
use crate::error::{EvictError, Result};

const STATE_MASK: u32 = 0xff;
const FLAGS_SHIFT: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefState {
    /// No page resident; the reference points at an on-disk address.
    OnDisk = 0,
    /// Exclusively held by one thread while it changes the page.
    Locked = 1,
    /// Page resident and available for reads and eviction.
    Mem = 2,
    Deleted = 3,
    /// Terminal: children took over the key range.
    Split = 4,
}

impl RefState {
    fn from_bits(bits: u32) -> Self {
        match bits & STATE_MASK {
            0 => RefState::OnDisk,
            1 => RefState::Locked,
            2 => RefState::Mem,
            3 => RefState::Deleted,
            _ => RefState::Split,
        }
    }
}

bitflags! {
    /// Reference flags carried alongside the state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RefFlags: u32 {
        const INTERNAL = 0b0001;
        const ROOT = 0b0010;
    }
}

pub(crate) fn pack(state: RefState, flags: RefFlags) -> u32 {
    (flags.bits() << FLAGS_SHIFT) | state as u32
}

/// Atomic reference state word.
pub struct StateWord(AtomicU32);

impl StateWord {
    pub fn new(state: RefState, flags: RefFlags) -> Self {
        Self(AtomicU32::new(pack(state, flags)))
    }

    pub fn state(&self) -> RefState {
        RefState::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn flags(&self) -> RefFlags {
        RefFlags::from_bits_truncate(self.0.load(Ordering::Acquire) >> FLAGS_SHIFT)
    }

    pub(crate) fn raw(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    /// Swaps `from` for `to` keeping the flags. Returns the previous word.
    pub(crate) fn cas_state(&self, from: RefState, to: RefState) -> Option<u32> {
        let cur = self.0.load(Ordering::Acquire);
        if RefState::from_bits(cur) != from {
            return None;
        }
        let next = (cur & !STATE_MASK) | to as u32;
        self.0
            .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
            .ok()
    }

    pub(crate) fn store_raw(&self, word: u32) {
        self.0.store(word, Ordering::Release);
    }
}

/// Exclusive hold on a reference obtained by the `MEM -> LOCKED` swap.
///
/// Only the holder can end the hold: `unlock` restores the exact previous
/// word, `finish` publishes an eviction outcome. Dropping the guard unlocks.
pub struct RefLock {
    r: Arc<Ref>,
    prev: u32,
    released: bool,
}

impl RefLock {
    /// Attempts `MEM -> LOCKED`. The loser gets `Busy` and must not touch the page.
    pub fn acquire(r: &Arc<Ref>) -> Result<Self> {
        match r.state_word().cas_state(RefState::Mem, RefState::Locked) {
            Some(prev) => Ok(Self {
                r: r.clone(),
                prev,
                released: false,
            }),
            None => Err(EvictError::Busy),
        }
    }

    /// Attempts `from -> LOCKED` for transitions other than eviction
    /// (reading a page in takes `ON_DISK -> LOCKED`).
    pub(crate) fn acquire_from(r: &Arc<Ref>, from: RefState) -> Result<Self> {
        match r.state_word().cas_state(from, RefState::Locked) {
            Some(prev) => Ok(Self {
                r: r.clone(),
                prev,
                released: false,
            }),
            None => Err(EvictError::Busy),
        }
    }

    pub fn reference(&self) -> &Arc<Ref> {
        &self.r
    }

    /// State the reference had before it was locked.
    pub fn previous(&self) -> RefState {
        RefState::from_bits(self.prev)
    }

    /// Restores the previous word exactly.
    pub fn unlock(mut self) {
        self.release_to(self.prev);
    }

    /// Publishes `state` (keeping flags) and ends the hold.
    pub fn finish(mut self, state: RefState) {
        let word = (self.prev & !STATE_MASK) | state as u32;
        self.release_to(word);
    }

    fn release_to(&mut self, word: u32) {
        debug_assert_eq!(self.r.state_word().state(), RefState::Locked);
        self.r.state_word().store_raw(word);
        self.released = true;
    }
}

impl Drop for RefLock {
    fn drop(&mut self) {
        if !self.released {
            let prev = self.prev;
            self.release_to(prev);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_word_keeps_flags_across_cas() {
        let w = StateWord::new(RefState::Mem, RefFlags::INTERNAL);
        let prev = w.cas_state(RefState::Mem, RefState::Locked).unwrap();
        assert_eq!(w.state(), RefState::Locked);
        assert_eq!(w.flags(), RefFlags::INTERNAL);
        assert_eq!(prev, pack(RefState::Mem, RefFlags::INTERNAL));
    }

    #[test]
    fn test_cas_from_wrong_state_fails() {
        let w = StateWord::new(RefState::OnDisk, RefFlags::empty());
        assert!(w.cas_state(RefState::Mem, RefState::Locked).is_none());
        assert_eq!(w.state(), RefState::OnDisk);
    }
}
