//! Resolved eviction settings, the input of `Engine::configure`.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CACHE_SIZE: u64 = 100 << 20;
pub const DEFAULT_STUCK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_ASSIST_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(5);

/// One percentage per eviction class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassPct {
    pub clean: f64,
    pub dirty: f64,
    pub updates: f64,
}

impl ClassPct {
    pub fn new(clean: f64, dirty: f64, updates: f64) -> Self {
        Self {
            clean,
            dirty,
            updates,
        }
    }

    pub fn default_targets() -> Self {
        Self::new(80.0, 5.0, 2.5)
    }

    pub fn default_triggers() -> Self {
        Self::new(95.0, 20.0, 10.0)
    }
}

/// Worker pool self-tuning parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TuningSettings {
    /// How often the tuner samples throughput.
    pub period: Duration,
    /// How long the pool stays settled before it re-tunes.
    pub force_retune: Duration,
    /// Samples taken before the pool settles.
    pub datapoints_min: u64,
    /// Workers added per step while ramping.
    pub batch: usize,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            period: Duration::from_millis(60),
            force_retune: Duration::from_secs(25),
            datapoints_min: 8,
            batch: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvictionSettings {
    pub cache_size: u64,
    /// Nothing can be discarded; dirty pages are only cleaned in place.
    pub in_memory: bool,
    pub targets: ClassPct,
    pub triggers: ClassPct,
    pub worker_min: usize,
    pub worker_max: usize,
    pub stuck_timeout: Duration,
    /// Upper bound on one application-assisted eviction call.
    pub assist_timeout: Duration,
    /// Abort on a stuck cache and check bucket placement on every enqueue.
    pub diagnostic: bool,
    pub tuning: TuningSettings,
    pub stats_interval: Duration,
}

impl EvictionSettings {
    pub fn new(
        targets: ClassPct,
        triggers: ClassPct,
        worker_min: usize,
        worker_max: usize,
        stuck_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let s = Self {
            cache_size: DEFAULT_CACHE_SIZE,
            in_memory: false,
            targets,
            triggers,
            worker_min,
            worker_max,
            stuck_timeout,
            assist_timeout: DEFAULT_ASSIST_TIMEOUT,
            diagnostic: false,
            tuning: TuningSettings::default(),
            stats_interval: DEFAULT_STATS_INTERVAL,
        };
        s.validate()?;
        Ok(s)
    }

    pub fn with_cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    pub fn with_in_memory(mut self, v: bool) -> Self {
        self.in_memory = v;
        self
    }

    pub fn with_assist_timeout(mut self, d: Duration) -> Self {
        self.assist_timeout = d;
        self
    }

    pub fn with_diagnostic(mut self, v: bool) -> Self {
        self.diagnostic = v;
        self
    }

    pub fn with_tuning(mut self, tuning: TuningSettings) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn with_stats_interval(mut self, d: Duration) -> Self {
        self.stats_interval = d;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        let classes = [
            ("clean", "eviction_target", "eviction_trigger", self.targets.clean, self.triggers.clean),
            ("dirty", "eviction_dirty_target", "eviction_dirty_trigger", self.targets.dirty, self.triggers.dirty),
            ("updates", "eviction_updates_target", "eviction_updates_trigger", self.targets.updates, self.triggers.updates),
        ];
        for (class, target_name, trigger_name, target, trigger) in classes {
            check_pct(target_name, target)?;
            check_pct(trigger_name, trigger)?;
            if trigger < target {
                return Err(ConfigError::TriggerBelowTarget {
                    class,
                    target,
                    trigger,
                });
            }
        }
        if self.worker_min == 0 {
            return Err(ConfigError::ZeroWorkerMin);
        }
        if self.worker_max < self.worker_min {
            return Err(ConfigError::WorkerMaxBelowMin {
                min: self.worker_min,
                max: self.worker_max,
            });
        }
        Ok(())
    }
}

impl Default for EvictionSettings {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            in_memory: false,
            targets: ClassPct::default_targets(),
            triggers: ClassPct::default_triggers(),
            worker_min: 1,
            worker_max: 8,
            stuck_timeout: DEFAULT_STUCK_TIMEOUT,
            assist_timeout: DEFAULT_ASSIST_TIMEOUT,
            diagnostic: false,
            tuning: TuningSettings::default(),
            stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }
}

fn check_pct(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(value > 0.0 && value <= 100.0) {
        return Err(ConfigError::PercentOutOfRange { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(EvictionSettings::default().validate(), Ok(()));
    }

    #[test]
    fn test_trigger_below_target_rejected() {
        let err = EvictionSettings::new(
            ClassPct::new(90.0, 5.0, 2.5),
            ClassPct::new(85.0, 20.0, 10.0),
            1,
            4,
            DEFAULT_STUCK_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::TriggerBelowTarget { class: "clean", .. }));
    }

    #[test]
    fn test_worker_bounds_rejected() {
        let t = ClassPct::default_targets();
        let g = ClassPct::default_triggers();
        assert_eq!(
            EvictionSettings::new(t, g, 0, 4, DEFAULT_STUCK_TIMEOUT),
            Err(ConfigError::ZeroWorkerMin)
        );
        assert_eq!(
            EvictionSettings::new(t, g, 4, 2, DEFAULT_STUCK_TIMEOUT),
            Err(ConfigError::WorkerMaxBelowMin { min: 4, max: 2 })
        );
    }

    #[test]
    fn test_percent_out_of_range_rejected() {
        let err = EvictionSettings::new(
            ClassPct::new(0.0, 5.0, 2.5),
            ClassPct::default_triggers(),
            1,
            1,
            DEFAULT_STUCK_TIMEOUT,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::PercentOutOfRange { name: "eviction_target", .. }));
    }
}
