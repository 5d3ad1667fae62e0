//! Worker count self-tuning.
//
// Ramps the pool one batch at a time while eviction throughput keeps
// improving, then settles on the best count seen. A settled pool sheds one
// worker after `force_retune` and starts ramping again.

use std::time::Instant;
use tracing::debug;

use crate::evict::TuningSettings;

pub struct Tuner {
    cfg: TuningSettings,
    min: usize,
    max: usize,
    stable: bool,
    last_time: Instant,
    last_action: Option<Instant>,
    progress_last: Option<u64>,
    num_points: u64,
    datapts_needed: u64,
    rate_max: u64,
    workers_best: usize,
}

impl Tuner {
    pub fn new(cfg: TuningSettings, min: usize, max: usize, now: Instant) -> Self {
        Self {
            cfg,
            min,
            max,
            stable: false,
            last_time: now,
            last_action: None,
            progress_last: None,
            num_points: 0,
            datapts_needed: cfg.datapoints_min,
            rate_max: 0,
            workers_best: min,
        }
    }

    pub fn is_stable(&self) -> bool {
        self.stable
    }

    pub fn workers_best(&self) -> usize {
        self.workers_best
    }

    fn clamp(&self, n: usize) -> usize {
        n.clamp(self.min, self.max)
    }

    /// Returns the worker count the pool should run with.
    ///
    /// `progress` is the cumulative eviction progress, `current` the running
    /// worker count and `needed` whether eviction currently has work.
    pub fn tune(&mut self, now: Instant, progress: u64, current: usize, needed: bool) -> usize {
        let mut target = self.clamp(current);
        if self.min == self.max {
            return target;
        }

        let since = now.saturating_duration_since(self.last_time);
        if self.stable {
            if since < self.cfg.force_retune {
                return target;
            }
            self.stable = false;
            self.last_action = None;
            self.progress_last = None;
            self.num_points = 0;
            self.rate_max = 0;
            if target > self.min {
                target -= 1;
            }
            debug!(component = "evictor", event = "force_retune", workers = target);
        } else if since < self.cfg.period {
            return target;
        }

        let Some(progress_last) = self.progress_last else {
            return self.done(now, progress, target);
        };

        let delta_ms = (since.as_millis() as u64).max(1);
        let rate = progress.saturating_sub(progress_last) * 1000 / delta_ms;
        self.num_points += 1;

        if rate > self.rate_max {
            self.rate_max = rate;
            self.workers_best = target;
        }

        if self.num_points >= self.datapts_needed {
            if self.workers_best == target && target < self.max {
                let step = ((self.max - target) / self.cfg.batch.max(1)) as u64;
                self.datapts_needed += step.min(self.cfg.datapoints_min);
            } else {
                target = self.clamp(self.workers_best);
                self.stable = true;
                debug!(
                    component = "evictor",
                    event = "tuning_settled",
                    workers = target,
                    rate_max = self.rate_max
                );
                return self.done(now, progress, target);
            }
        }

        if self.last_action.is_none() {
            self.datapts_needed = self.cfg.datapoints_min;
        }

        if needed {
            target = (target + self.cfg.batch).min(self.max);
            self.last_action = Some(now);
        }

        self.done(now, progress, target)
    }

    fn done(&mut self, now: Instant, progress: u64, target: usize) -> usize {
        self.last_time = now;
        self.progress_last = Some(progress);
        self.clamp(target)
    }
}
