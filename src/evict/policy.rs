//! Which eviction classes the cache needs right now.
//
// Everything here is a pure function of the byte counters and settings and
// is recomputed every pass.

use bitflags::bitflags;

use super::settings::EvictionSettings;
use crate::bucket::SetKind;
use crate::tree::BytesSnapshot;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EvictFlags: u32 {
        const CLEAN = 1 << 0;
        const CLEAN_HARD = 1 << 1;
        const DIRTY = 1 << 2;
        const DIRTY_HARD = 1 << 3;
        const UPDATES = 1 << 4;
        const UPDATES_HARD = 1 << 5;
        /// Write dirty pages but keep them resident.
        const SCRUB = 1 << 6;

        const ALL = Self::CLEAN.bits() | Self::DIRTY.bits() | Self::UPDATES.bits();
        const HARD = Self::CLEAN_HARD.bits() | Self::DIRTY_HARD.bits() | Self::UPDATES_HARD.bits();
    }
}

impl EvictFlags {
    /// Whether any class needs eviction.
    pub fn needed(self) -> bool {
        self.intersects(EvictFlags::ALL)
    }

    pub fn is_hard(self) -> bool {
        self.intersects(EvictFlags::HARD)
    }

    /// Only clean and/or updates eviction requested: checkpointing trees
    /// are fair game.
    pub fn clean_or_updates_only(self) -> bool {
        self.intersects(EvictFlags::CLEAN | EvictFlags::UPDATES) && !self.contains(EvictFlags::DIRTY)
    }

    /// Bucket sets worth scanning, in scan order.
    pub fn sets(self) -> &'static [SetKind] {
        if self.contains(EvictFlags::CLEAN) {
            &SetKind::ALL
        } else if self.intersects(EvictFlags::DIRTY | EvictFlags::UPDATES) {
            &DIRTY_SETS
        } else {
            &[]
        }
    }
}

const DIRTY_SETS: [SetKind; 2] = [SetKind::DirtyLeaf, SetKind::DirtyInternal];

fn pct(bytes: u64, cache_size: u64) -> f64 {
    if cache_size == 0 {
        return 0.0;
    }
    bytes as f64 / cache_size as f64 * 100.0
}

/// Usage of each class as a percentage of the cache size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    pub clean: f64,
    pub dirty: f64,
    pub updates: f64,
}

impl Usage {
    pub fn of(bytes: &BytesSnapshot, settings: &EvictionSettings) -> Self {
        Self {
            clean: pct(bytes.inmem, settings.cache_size),
            dirty: pct(bytes.dirty, settings.cache_size),
            updates: pct(bytes.updates, settings.cache_size),
        }
    }
}

pub fn exceeds_target(usage: f64, target: f64) -> bool {
    usage >= target
}

pub fn exceeds_trigger(usage: f64, trigger: f64) -> bool {
    usage >= trigger
}

/// Flags for one pass of background eviction.
pub fn compute(bytes: &BytesSnapshot, settings: &EvictionSettings, aggressive: bool) -> EvictFlags {
    let u = Usage::of(bytes, settings);
    let (t, g) = (&settings.targets, &settings.triggers);
    let mut flags = EvictFlags::empty();

    if exceeds_target(u.clean, t.clean) {
        flags |= EvictFlags::CLEAN;
    }
    if exceeds_trigger(u.clean, g.clean) {
        flags |= EvictFlags::CLEAN | EvictFlags::CLEAN_HARD;
    }
    if exceeds_target(u.dirty, t.dirty) {
        flags |= EvictFlags::DIRTY;
    }
    if exceeds_trigger(u.dirty, g.dirty) {
        flags |= EvictFlags::DIRTY | EvictFlags::DIRTY_HARD;
    }
    if exceeds_target(u.updates, t.updates) {
        flags |= EvictFlags::UPDATES;
    }
    if exceeds_trigger(u.updates, g.updates) {
        flags |= EvictFlags::UPDATES | EvictFlags::UPDATES_HARD;
    }

    if aggressive && flags.contains(EvictFlags::CLEAN_HARD) {
        flags |= EvictFlags::DIRTY;
    }

    if u.clean < (t.clean + g.clean) / 2.0 && u.dirty < (t.dirty + g.dirty) / 2.0 {
        flags |= EvictFlags::SCRUB;
    }

    if settings.in_memory {
        if flags.contains(EvictFlags::CLEAN) {
            flags |= EvictFlags::DIRTY;
        }
        if flags.contains(EvictFlags::CLEAN_HARD) {
            flags |= EvictFlags::DIRTY_HARD;
        }
        flags.remove(EvictFlags::CLEAN | EvictFlags::CLEAN_HARD);
        flags |= EvictFlags::SCRUB;
    }

    flags
}

/// Whether an application thread about to grow the cache must help evict,
/// and how full the cache is relative to its triggers (100 = at a trigger).
pub fn needed(
    bytes: &BytesSnapshot,
    settings: &EvictionSettings,
    busy: bool,
    readonly: bool,
) -> (bool, f64) {
    let u = Usage::of(bytes, settings);
    let g = &settings.triggers;

    let clean = exceeds_trigger(u.clean, g.clean);
    let (dirty_pct, updates_pct) = if readonly { (0.0, 0.0) } else { (u.dirty, u.updates) };
    let dirty = !readonly && exceeds_trigger(u.dirty, g.dirty);
    let updates = !readonly && exceeds_trigger(u.updates, g.updates);

    let headroom = (g.clean - u.clean)
        .min(g.dirty - dirty_pct)
        .min(g.updates - updates_pct);
    let pct_full = (100.0 - headroom).max(0.0);

    (clean || updates || (!busy && dirty), pct_full)
}
