use super::{Cache, Config, EngineBox, Eviction, Logs, Tuning, Workload};
use std::time::Duration;

/// Creates a new test configuration: a 16MB cache with one or two workers
/// and tight timeouts.
pub fn new_test_config() -> Config {
    Config {
        engine: EngineBox {
            env: super::TEST.to_string(),
            logs: Some(Logs {
                level: Some("debug".to_string()),
            }),
            cache: Some(Cache {
                size: Some(16 << 20),
                in_memory: false,
            }),
            eviction: Some(Eviction {
                target: Some(80.0),
                trigger: Some(95.0),
                dirty_target: Some(5.0),
                dirty_trigger: Some(20.0),
                updates_target: Some(2.5),
                updates_trigger: Some(10.0),
                threads_min: Some(1),
                threads_max: Some(2),
                stuck_timeout: Some(Duration::from_secs(5)),
                assist_timeout: Some(Duration::from_millis(200)),
                diagnostic: true,
            }),
            tuning: Some(Tuning {
                period: Some(Duration::from_millis(20)),
                force_retune: Some(Duration::from_secs(1)),
                datapoints_min: Some(2),
                batch: Some(1),
            }),
            stats_interval: Some(Duration::from_millis(200)),
            workload: Some(Workload {
                trees: 2,
                pages_per_tree: 32,
                page_size: 64 << 10,
                update_size: 256,
                threads: 2,
                duration: Duration::from_millis(200),
                write_ratio: 0.3,
                wont_need_ratio: 0.05,
            }),
        },
    }
}
