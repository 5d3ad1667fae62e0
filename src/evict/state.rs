//! Cache-wide eviction state shared by workers and application threads.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::policy::EvictFlags;
use crate::page::readgen;

/// Upper end of the aggressive score.
pub const AGGRESSIVE_MAX: u32 = 100;
/// Score at which eviction counts as aggressive.
pub const AGGRESSIVE_CUTOFF: u32 = 10;

pub struct EvictState {
    flags: AtomicU32,
    aggressive: AtomicU32,
    progress: AtomicU64,
    read_gen: AtomicU64,
    read_gen_oldest: AtomicU64,
}

impl EvictState {
    pub fn new() -> Self {
        Self {
            flags: AtomicU32::new(0),
            aggressive: AtomicU32::new(0),
            progress: AtomicU64::new(0),
            read_gen: AtomicU64::new(readgen::START_VALUE),
            read_gen_oldest: AtomicU64::new(readgen::START_VALUE),
        }
    }

    pub fn flags(&self) -> EvictFlags {
        EvictFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn set_flags(&self, flags: EvictFlags) {
        self.flags.store(flags.bits(), Ordering::Release);
    }

    pub fn aggressive_score(&self) -> u32 {
        self.aggressive.load(Ordering::Relaxed)
    }

    pub fn is_aggressive(&self) -> bool {
        self.aggressive_score() >= AGGRESSIVE_CUTOFF
    }

    /// Eviction cannot make progress and threads should give up their
    /// transactions.
    pub fn is_stuck(&self) -> bool {
        self.aggressive_score() == AGGRESSIVE_MAX && self.flags().is_hard()
    }

    pub(crate) fn raise_aggressive(&self, by: u32) -> u32 {
        let prev = self
            .aggressive
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                Some((s + by).min(AGGRESSIVE_MAX))
            })
            .unwrap_or(AGGRESSIVE_MAX);
        (prev + by).min(AGGRESSIVE_MAX)
    }

    pub(crate) fn lower_aggressive(&self) -> u32 {
        let prev = self
            .aggressive
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| Some(s.saturating_sub(1)))
            .unwrap_or(0);
        prev.saturating_sub(1)
    }

    /// Pages evicted (or scrubbed) since startup.
    pub fn progress(&self) -> u64 {
        self.progress.load(Ordering::Acquire)
    }

    pub(crate) fn add_progress(&self) {
        self.progress.fetch_add(1, Ordering::AcqRel);
    }

    pub fn read_gen(&self) -> u64 {
        self.read_gen.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_read_gen(&self) -> u64 {
        self.read_gen.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Generation of the last page eviction removed.
    pub fn read_gen_oldest(&self) -> u64 {
        self.read_gen_oldest.load(Ordering::Relaxed)
    }

    pub(crate) fn set_read_gen_oldest(&self, gen: u64) {
        if !readgen::is_evict_soon(gen) && gen != readgen::NOTSET {
            self.read_gen_oldest.store(gen, Ordering::Relaxed);
        }
    }

    /// Generation for a page entering memory.
    pub fn new_page_gen(&self) -> u64 {
        readgen::new_page(self.read_gen(), self.read_gen_oldest())
    }
}

impl Default for EvictState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggressive_score_is_clamped() {
        let s = EvictState::new();
        assert_eq!(s.lower_aggressive(), 0);
        assert_eq!(s.raise_aggressive(AGGRESSIVE_MAX + 5), AGGRESSIVE_MAX);
        assert!(s.is_aggressive());
        assert_eq!(s.lower_aggressive(), AGGRESSIVE_MAX - 1);
    }

    #[test]
    fn test_stuck_needs_max_score_and_hard_pressure() {
        let s = EvictState::new();
        s.raise_aggressive(AGGRESSIVE_MAX);
        assert!(!s.is_stuck());
        s.set_flags(EvictFlags::CLEAN | EvictFlags::CLEAN_HARD);
        assert!(s.is_stuck());
    }

    #[test]
    fn test_sentinel_generations_do_not_move_oldest() {
        let s = EvictState::new();
        s.set_read_gen_oldest(readgen::WONT_NEED);
        assert_eq!(s.read_gen_oldest(), readgen::START_VALUE);
        s.set_read_gen_oldest(450);
        assert_eq!(s.read_gen_oldest(), 450);
    }
}
