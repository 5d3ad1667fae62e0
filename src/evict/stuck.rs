//! Aggressive-score bookkeeping and stuck-cache detection, both driven by
//! the coordinator once per pass.

use std::time::{Duration, Instant};

use super::state::EvictState;

/// Time without progress under hard pressure that raises the score by one.
pub const NO_PROGRESS_STEP: Duration = Duration::from_millis(20);

/// Tracks progress between passes and moves the aggressive score.
pub struct Aggression {
    last_progress: u64,
    last_progress_at: Instant,
    last_oldest: u64,
}

impl Aggression {
    pub fn new(now: Instant) -> Self {
        Self {
            last_progress: 0,
            last_progress_at: now,
            last_oldest: 0,
        }
    }

    /// Observes one pass and returns the new score.
    ///
    /// `oldest` and `current` are the transaction ids at the time of the
    /// pass; an oldest id that did not move while others run means some
    /// transaction is pinning the cache.
    pub fn observe(
        &mut self,
        state: &EvictState,
        hard: bool,
        oldest: u64,
        current: u64,
        now: Instant,
    ) -> u32 {
        let progress = state.progress();
        let pinned = oldest == self.last_oldest && current != oldest;
        self.last_oldest = oldest;

        if progress != self.last_progress {
            self.last_progress = progress;
            self.last_progress_at = now;
            return state.lower_aggressive();
        }
        if !hard {
            self.last_progress_at = now;
            return state.aggressive_score();
        }
        if now.duration_since(self.last_progress_at) < NO_PROGRESS_STEP {
            return state.aggressive_score();
        }
        self.last_progress_at = now;
        state.raise_aggressive(if pinned { 2 } else { 1 })
    }
}

/// Remembers when the cache became stuck.
pub struct StuckDetector {
    since: Option<Instant>,
    reported: bool,
}

/// Result of one stuck check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StuckCheck {
    Ok,
    Stuck(Duration),
    /// Stuck longer than the timeout; reported once per episode.
    TimedOut(Duration),
}

impl StuckDetector {
    pub fn new() -> Self {
        Self {
            since: None,
            reported: false,
        }
    }

    pub fn check(&mut self, stuck: bool, timeout: Duration, now: Instant) -> StuckCheck {
        if !stuck {
            self.since = None;
            self.reported = false;
            return StuckCheck::Ok;
        }
        let since = *self.since.get_or_insert(now);
        let elapsed = now.duration_since(since);
        if elapsed >= timeout && !self.reported {
            self.reported = true;
            return StuckCheck::TimedOut(elapsed);
        }
        StuckCheck::Stuck(elapsed)
    }

    pub fn stuck_since(&self) -> Option<Instant> {
        self.since
    }
}

impl Default for StuckDetector {
    fn default() -> Self {
        Self::new()
    }
}
