// Configuration loading and management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::evict::settings::{DEFAULT_ASSIST_TIMEOUT, DEFAULT_CACHE_SIZE, DEFAULT_STATS_INTERVAL, DEFAULT_STUCK_TIMEOUT};
use crate::evict::{ClassPct, EvictionSettings, TuningSettings};

pub mod test_config;

pub const PROD: &str = "prod";
#[allow(dead_code)]
pub const DEV: &str = "dev";
#[allow(dead_code)]
pub const TEST: &str = "test";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(rename = "engine")]
    pub engine: EngineBox,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineBox {
    pub env: String,
    pub logs: Option<Logs>,
    pub cache: Option<Cache>,
    pub eviction: Option<Eviction>,
    pub tuning: Option<Tuning>,
    #[serde(default, with = "humantime_serde")]
    pub stats_interval: Option<Duration>,
    pub workload: Option<Workload>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logs {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Cache {
    /// Cache size in bytes.
    pub size: Option<u64>,
    #[serde(default)]
    pub in_memory: bool,
}

/// Percentages are of the cache size.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Eviction {
    pub target: Option<f64>,
    pub trigger: Option<f64>,
    pub dirty_target: Option<f64>,
    pub dirty_trigger: Option<f64>,
    pub updates_target: Option<f64>,
    pub updates_trigger: Option<f64>,
    pub threads_min: Option<usize>,
    pub threads_max: Option<usize>,
    #[serde(default, with = "humantime_serde")]
    pub stuck_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub assist_timeout: Option<Duration>,
    #[serde(default)]
    pub diagnostic: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Tuning {
    #[serde(default, with = "humantime_serde")]
    pub period: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub force_retune: Option<Duration>,
    pub datapoints_min: Option<u64>,
    pub batch: Option<usize>,
}

/// Synthetic load driven by the binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Workload {
    pub trees: usize,
    pub pages_per_tree: usize,
    /// Footprint of a freshly read page in bytes.
    pub page_size: u64,
    /// Bytes added by one update.
    pub update_size: u64,
    /// Zero means one thread per core.
    #[serde(default)]
    pub threads: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Share of operations that modify a page, 0.0..=1.0.
    pub write_ratio: f64,
    /// Share of reads issued with the wont-need hint.
    #[serde(default)]
    pub wont_need_ratio: f64,
}

impl Default for Workload {
    fn default() -> Self {
        Self {
            trees: 4,
            pages_per_tree: 1024,
            page_size: 64 << 10,
            update_size: 512,
            threads: 0,
            duration: Duration::from_secs(10),
            write_ratio: 0.2,
            wont_need_ratio: 0.0,
        }
    }
}

pub trait ConfigTrait {
    fn logs(&self) -> Option<&Logs>;
    fn is_prod(&self) -> bool;
    #[allow(dead_code)]
    fn is_dev(&self) -> bool;
    #[allow(dead_code)]
    fn is_test(&self) -> bool;
    fn workload(&self) -> Workload;
}

impl ConfigTrait for Config {
    fn logs(&self) -> Option<&Logs> {
        self.engine.logs.as_ref()
    }

    fn is_prod(&self) -> bool {
        self.engine.env == PROD
    }

    fn is_dev(&self) -> bool {
        self.engine.env == DEV
    }

    fn is_test(&self) -> bool {
        self.engine.env == TEST
    }

    fn workload(&self) -> Workload {
        self.engine.workload.clone().unwrap_or_default()
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let abs_path = path
            .canonicalize()
            .with_context(|| format!("failed to resolve absolute config filepath: {:?}", path))?;

        let data = std::fs::read_to_string(&abs_path)
            .with_context(|| format!("read config yaml file {:?}", abs_path))?;

        Self::parse(&data).with_context(|| format!("unmarshal yaml from {:?}", abs_path))
    }

    pub fn parse(data: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(data)?;
        Ok(cfg)
    }

    /// Resolves the file sections into validated eviction settings, filling
    /// unset values with the engine defaults.
    pub fn settings(&self) -> Result<EvictionSettings, ConfigError> {
        let ev = self.engine.eviction.clone().unwrap_or_default();
        let dt = ClassPct::default_targets();
        let dg = ClassPct::default_triggers();
        let targets = ClassPct::new(
            ev.target.unwrap_or(dt.clean),
            ev.dirty_target.unwrap_or(dt.dirty),
            ev.updates_target.unwrap_or(dt.updates),
        );
        let triggers = ClassPct::new(
            ev.trigger.unwrap_or(dg.clean),
            ev.dirty_trigger.unwrap_or(dg.dirty),
            ev.updates_trigger.unwrap_or(dg.updates),
        );

        let dtun = TuningSettings::default();
        let tuning = self.engine.tuning.clone().unwrap_or_default();
        let tuning = TuningSettings {
            period: tuning.period.unwrap_or(dtun.period),
            force_retune: tuning.force_retune.unwrap_or(dtun.force_retune),
            datapoints_min: tuning.datapoints_min.unwrap_or(dtun.datapoints_min),
            batch: tuning.batch.unwrap_or(dtun.batch),
        };

        let cache = self.engine.cache.as_ref();
        let settings = EvictionSettings::new(
            targets,
            triggers,
            ev.threads_min.unwrap_or(1),
            ev.threads_max.unwrap_or(8),
            ev.stuck_timeout.unwrap_or(DEFAULT_STUCK_TIMEOUT),
        )?
        .with_cache_size(cache.and_then(|c| c.size).unwrap_or(DEFAULT_CACHE_SIZE))
        .with_in_memory(cache.is_some_and(|c| c.in_memory))
        .with_assist_timeout(ev.assist_timeout.unwrap_or(DEFAULT_ASSIST_TIMEOUT))
        .with_diagnostic(ev.diagnostic)
        .with_tuning(tuning)
        .with_stats_interval(self.engine.stats_interval.unwrap_or(DEFAULT_STATS_INTERVAL));

        settings.validate()?;
        Ok(settings)
    }
}
