//! Eviction performed inline by application threads.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::policy;
use super::Cache;
use crate::error::{EvictError, Result};
use crate::txn::Session;
use crate::workers::evictor::Counters;

/// Pages of global progress after which an assisting thread may return,
/// unless the cache is full.
pub const BUSY_MAX_PROGRESS: u64 = 5;
pub const MAX_PROGRESS: u64 = 20;
/// Wait for workers to repopulate candidates after an empty scan.
pub const NOT_FOUND_WAIT: Duration = Duration::from_millis(10);

impl Cache {
    /// Makes the calling thread help evict when the cache is over a
    /// trigger. Returns immediately otherwise.
    ///
    /// `busy` threads hold other resources and leave after one successful
    /// eviction; `readonly` operations ignore dirty and update pressure.
    pub fn assist_if_needed(&self, session: &Session, busy: bool, readonly: bool) -> Result<()> {
        let (need, pct_full) = policy::needed(&self.bytes.snapshot(), &self.settings, busy, readonly);
        if !need {
            return Ok(());
        }
        if busy && pct_full < 100.0 {
            return Ok(());
        }
        self.assist(session, busy, readonly)
    }

    fn assist(&self, session: &Session, mut busy: bool, readonly: bool) -> Result<()> {
        let started = Instant::now();
        let initial = self.state.progress();

        loop {
            if started.elapsed() >= self.settings.assist_timeout {
                debug!(
                    component = "evictor",
                    event = "assist_timeout",
                    elapsed = ?started.elapsed()
                );
                return Ok(());
            }

            if self.state.is_stuck() && session.is_oldest(&self.txn) {
                self.state.lower_aggressive();
                Counters::inc(&self.counters.rollbacks);
                warn!(
                    component = "evictor",
                    event = "rollback_requested",
                    txn = session.txn_id(),
                    "cache is stuck and this transaction is the oldest"
                );
                return Err(EvictError::RollbackRequired(
                    "oldest pinned transaction rolled back for eviction",
                ));
            }

            // A thread pinning a snapshot holds back others; keep its work short.
            if !busy && session.pins_snapshot(&self.txn) {
                busy = true;
            }
            let max_progress = if busy { BUSY_MAX_PROGRESS } else { MAX_PROGRESS };

            let bytes = self.bytes.snapshot();
            let (need, pct_full) = policy::needed(&bytes, &self.settings, busy, readonly);
            if !need {
                return Ok(());
            }
            // A full cache keeps the thread working past its progress quota.
            if pct_full < 100.0 && self.state.progress() > initial + max_progress {
                return Ok(());
            }
            let flags = policy::compute(&bytes, &self.settings, self.state.is_aggressive());

            match self.evict_one(session, flags) {
                Ok(_) => {
                    Counters::inc(&self.counters.app_evicted);
                    if busy {
                        return Ok(());
                    }
                }
                Err(EvictError::Busy) => {}
                Err(EvictError::NotFound) => {
                    Counters::inc(&self.counters.app_waits);
                    self.wake.wait_for(NOT_FOUND_WAIT);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
