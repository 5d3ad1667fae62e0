// Package evictor provides telemetry for eviction.

use crate::evict::Cache;

pub const EVICTED_PAGES: &str = "evict_pages_total";
pub const EVICTED_BYTES: &str = "evict_bytes_total";
pub const SCRUBBED_PAGES: &str = "evict_scrubbed_pages_total";
pub const RECONCILE_FAILURES: &str = "evict_reconcile_failures_total";
pub const APP_EVICTED: &str = "evict_app_pages_total";
pub const APP_WAITS: &str = "evict_app_waits_total";
pub const ROLLBACKS: &str = "evict_rollbacks_total";
pub const WORKERS: &str = "evict_workers";
pub const AGGRESSIVE_SCORE: &str = "evict_aggressive_score";
pub const CACHE_BYTES_INMEM: &str = "cache_bytes_inmem";
pub const CACHE_BYTES_DIRTY: &str = "cache_bytes_dirty";
pub const CACHE_BYTES_UPDATES: &str = "cache_bytes_updates";

/// Logs eviction statistics and updates metrics.
pub fn log_stats(name: &str, cache: &Cache, workers: usize) {
    let c = cache.counters().reset();
    let bytes = cache.bytes();
    let state = cache.state();

    metrics::counter!(EVICTED_PAGES).increment(c.evicted_pages);
    metrics::counter!(EVICTED_BYTES).increment(c.evicted_bytes);
    metrics::counter!(SCRUBBED_PAGES).increment(c.scrubbed_pages);
    metrics::counter!(RECONCILE_FAILURES).increment(c.reconcile_failures);
    metrics::counter!(APP_EVICTED).increment(c.app_evicted);
    metrics::counter!(APP_WAITS).increment(c.app_waits);
    metrics::counter!(ROLLBACKS).increment(c.rollbacks);
    metrics::gauge!(WORKERS).set(workers as f64);
    metrics::gauge!(AGGRESSIVE_SCORE).set(state.aggressive_score() as f64);
    metrics::gauge!(CACHE_BYTES_INMEM).set(bytes.inmem as f64);
    metrics::gauge!(CACHE_BYTES_DIRTY).set(bytes.dirty as f64);
    metrics::gauge!(CACHE_BYTES_UPDATES).set(bytes.updates as f64);

    tracing::info!(
        name = %name,
        component = "evictor",
        event = "stats",
        workers = workers,
        flags = ?state.flags(),
        aggressive = state.aggressive_score(),
        inmem = bytes.inmem,
        dirty = bytes.dirty,
        updates = bytes.updates,
        pages = bytes.pages,
        evicted_pages = c.evicted_pages,
        evicted_bytes = c.evicted_bytes,
        scrubbed = c.scrubbed_pages,
        failures = c.reconcile_failures,
        app_evicted = c.app_evicted,
        app_waits = c.app_waits,
        rollbacks = c.rollbacks,
        not_found = c.not_found,
        lost_enqueues = c.lost_enqueues,
        "eviction statistics"
    );
}
