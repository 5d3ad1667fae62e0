//! Eviction worker functionality.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::{EvictError, Result};
use crate::evict::stuck::{Aggression, StuckCheck, StuckDetector};
use crate::evict::Cache;
use crate::txn::Session;

use super::counters::Counters;
use super::telemetry;
use super::tune::Tuner;

/// Coordinator pass interval.
pub const PASS_INTERVAL: Duration = Duration::from_millis(10);
/// How long an idle worker sleeps before re-checking the flags.
pub const IDLE_WAIT: Duration = Duration::from_millis(100);
/// Failed attempts in a row before a worker backs off.
pub const FAILURES_BEFORE_WAIT: u32 = 8;
pub const FAILURE_WAIT: Duration = Duration::from_millis(10);

/// Scalable worker group for cache eviction.
///
/// One coordinator thread recomputes the eviction flags, moves the
/// aggressive score, watches for a stuck cache and tunes the pool size.
/// Workers only evict; worker `i` exits once the target drops to `i` or
/// below.
pub struct Evictor {
    name: String,
    cache: Arc<Cache>,
    run: Arc<AtomicBool>,
    target: Arc<AtomicUsize>,
    workers_active: Arc<AtomicUsize>,
    workers: Mutex<Vec<Option<JoinHandle<()>>>>,
    coordinator: Mutex<Option<JoinHandle<()>>>,
}

impl Evictor {
    /// Creates a new evictor group.
    pub fn new(name: String, cache: Arc<Cache>) -> Arc<Self> {
        Arc::new(Self {
            name,
            cache,
            run: Arc::new(AtomicBool::new(false)),
            target: Arc::new(AtomicUsize::new(0)),
            workers_active: Arc::new(AtomicUsize::new(0)),
            workers: Mutex::new(Vec::new()),
            coordinator: Mutex::new(None),
        })
    }

    pub fn is_running(&self) -> bool {
        self.run.load(Ordering::Acquire)
    }

    /// Workers currently alive.
    pub fn replicas(&self) -> usize {
        self.workers_active.load(Ordering::Acquire)
    }

    /// Worker count the pool is converging to.
    pub fn target(&self) -> usize {
        self.target.load(Ordering::Acquire)
    }

    /// Starts `worker_min` workers and the coordinator.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        if self
            .run
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(name = %self.name, component = "evictor", "already started, nothing to change");
            return Ok(());
        }

        let min = self.cache.settings().worker_min;
        if let Err(err) = self.scale_to(min) {
            self.stop();
            return Err(err);
        }

        let this = self.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-coordinator", self.name))
            .spawn(move || this.coordinate())
            .map_err(EvictError::Spawn);
        match handle {
            Ok(h) => *self.coordinator.lock() = Some(h),
            Err(err) => {
                self.stop();
                return Err(err);
            }
        }

        info!(
            name = %self.name,
            component = "evictor",
            event = "started",
            workers_min = min,
            workers_max = self.cache.settings().worker_max,
            "eviction started"
        );
        Ok(())
    }

    /// Clears the run flag and joins every thread. Safe to call more than
    /// once, and before `start`.
    pub fn stop(&self) {
        let was_running = self.run.swap(false, Ordering::AcqRel);
        self.cache.wake.notify_all();

        if let Some(h) = self.coordinator.lock().take() {
            if h.join().is_err() {
                error!(name = %self.name, component = "evictor", "coordinator panicked");
            }
        }
        let handles: Vec<_> = self.workers.lock().drain(..).flatten().collect();
        for h in handles {
            if h.join().is_err() {
                error!(name = %self.name, component = "evictor", "worker panicked");
            }
        }
        self.target.store(0, Ordering::Release);

        if was_running {
            info!(name = %self.name, component = "evictor", event = "stopped", "eviction stopped");
        }
    }

    /// Moves the pool to `n` workers. Surplus workers notice on their next
    /// loop check; missing ones are spawned here.
    fn scale_to(self: &Arc<Self>, n: usize) -> Result<()> {
        let prev = self.target.swap(n, Ordering::AcqRel);
        if n < prev {
            info!(name = %self.name, component = "evictor", from = prev, to = n, "downscaling");
            self.cache.wake.notify_all();
        }

        let mut workers = self.workers.lock();
        for slot in workers.iter_mut() {
            if slot.as_ref().is_some_and(JoinHandle::is_finished) {
                if let Some(h) = slot.take() {
                    let _ = h.join();
                }
            }
        }
        if workers.len() < n {
            workers.resize_with(n, || None);
        }
        for i in 0..n {
            if workers[i].is_none() {
                workers[i] = Some(self.up_one(i)?);
            }
        }
        Ok(())
    }

    /// Ups one worker.
    fn up_one(self: &Arc<Self>, idx: usize) -> Result<JoinHandle<()>> {
        let cache = self.cache.clone();
        let run = self.run.clone();
        let target = self.target.clone();
        let workers_active = self.workers_active.clone();
        let name = format!("{}-{}", self.name, idx);

        workers_active.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            info!(name = %name, component = "evictor", "worker upped");

            let _guard = {
                struct Guard {
                    workers_active: Arc<AtomicUsize>,
                    name: String,
                }
                impl Drop for Guard {
                    fn drop(&mut self) {
                        self.workers_active.fetch_sub(1, Ordering::AcqRel);
                        info!(name = %self.name, component = "evictor", "worker is gone");
                    }
                }
                Guard {
                    workers_active,
                    name: name.clone(),
                }
            };

            work(&cache, &run, &target, idx);
        });

        spawned.map_err(|err| {
            self.workers_active.fetch_sub(1, Ordering::AcqRel);
            EvictError::Spawn(err)
        })
    }

    /// Coordinator loop.
    fn coordinate(self: Arc<Self>) {
        let settings = self.cache.settings().clone();
        let now = Instant::now();
        let mut tuner = Tuner::new(settings.tuning, settings.worker_min, settings.worker_max, now);
        let mut aggression = Aggression::new(now);
        let mut stuck = StuckDetector::new();
        let mut last_stats = now;

        while self.is_running() {
            let now = Instant::now();
            let state = self.cache.state();
            let txn = self.cache.txn();

            state.bump_read_gen();
            let flags = self.cache.update_flags();
            aggression.observe(state, flags.is_hard(), txn.oldest(), txn.current(), now);

            if let StuckCheck::TimedOut(elapsed) = stuck.check(state.is_stuck(), settings.stuck_timeout, now) {
                error!(
                    name = %self.name,
                    component = "evictor",
                    event = "cache_stuck",
                    elapsed = ?elapsed,
                    aggressive = state.aggressive_score(),
                    flags = ?flags,
                    "cache stuck: no eviction progress"
                );
                if settings.diagnostic {
                    std::process::abort();
                }
            }

            let want = tuner.tune(now, state.progress(), self.target(), flags.needed());
            if want != self.target() || self.replicas() < want {
                if let Err(err) = self.scale_to(want) {
                    warn!(name = %self.name, component = "evictor", error = %err, "scaling failed");
                }
            }

            if flags.needed() {
                self.cache.wake.notify_all();
            }

            if now.duration_since(last_stats) >= settings.stats_interval {
                telemetry::log_stats(&self.name, &self.cache, self.replicas());
                last_stats = now;
            }

            thread::sleep(PASS_INTERVAL);
        }
    }
}

/// Worker loop.
fn work(cache: &Cache, run: &AtomicBool, target: &AtomicUsize, idx: usize) {
    let mut session = Session::new();
    let mut failures = 0u32;

    while run.load(Ordering::Acquire) && idx < target.load(Ordering::Acquire) {
        let flags = cache.state().flags();
        if !flags.needed() {
            cache.wake.wait_for(IDLE_WAIT);
            continue;
        }

        session.refresh(cache.txn());
        match cache.evict_one(&session, flags) {
            Ok(_) => failures = 0,
            Err(EvictError::NotFound) => {
                Counters::inc(&cache.counters().not_found);
                failures += 1;
            }
            Err(EvictError::Busy) | Err(EvictError::Reconcile(_)) => failures += 1,
            Err(err) => {
                warn!(component = "evictor", event = "evict_failed", error = %err);
                failures += 1;
            }
        }

        if failures >= FAILURES_BEFORE_WAIT {
            cache.wake.wait_for(FAILURE_WAIT);
            failures = 0;
        }
    }
}
