// Main entrypoint for the pagevict eviction engine driver.

use pagevict::backend::memory::{MemBlockStore, StoreReconciler};
use pagevict::backend::BlockManager;
use pagevict::config::{Config, ConfigTrait, Workload};
use pagevict::page::RefFlags;
use pagevict::tree::TreeId;
use pagevict::txn::Session;
use pagevict::{Engine, EvictError};

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const CONFIG_PATH: &str = "cfg/pagevict.cfg.yaml";
const CONFIG_PATH_LOCAL: &str = "cfg/pagevict.cfg.local.yaml";

/// pagevict - page cache eviction engine driven by a synthetic workload
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE")]
    cfg: Option<PathBuf>,
}

/// Loads the configuration struct from YAML file.
/// Tries local config first, then falls back to default config.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    if let Some(custom_path) = path {
        let cfg = Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?;
        info!(
            component = "config",
            event = "load_success",
            path = ?custom_path,
            "config loaded"
        );
        return Ok(cfg);
    }

    match Config::load(PathBuf::from(CONFIG_PATH_LOCAL)) {
        Ok(cfg) => {
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH_LOCAL,
                "config loaded"
            );
            Ok(cfg)
        }
        Err(_) => {
            let cfg = Config::load(PathBuf::from(CONFIG_PATH))
                .with_context(|| format!("failed to load config from {}", CONFIG_PATH))?;
            info!(
                component = "config",
                event = "load_success",
                path = CONFIG_PATH,
                "config loaded"
            );
            Ok(cfg)
        }
    }
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_ref())
        .map(|s| s.as_str())
        .unwrap_or("info");

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    if cfg.is_prod() {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    }
}

/// Resolves the workload thread count; zero means one per core.
fn workload_threads(w: &Workload) -> usize {
    if w.threads > 0 {
        return w.threads;
    }
    let cores = num_cpus::get();
    info!(
        component = "main",
        event = "num_cpus_configured",
        num_cpus = cores,
        "workload threads configured (using all available cores)"
    );
    cores
}

#[derive(Debug, Default, Clone, Copy)]
struct OpStats {
    reads: u64,
    writes: u64,
    busy: u64,
    rollbacks: u64,
}

impl OpStats {
    fn merge(&mut self, o: OpStats) {
        self.reads += o.reads;
        self.writes += o.writes;
        self.busy += o.busy;
        self.rollbacks += o.rollbacks;
    }
}

/// Lays out `pages` on-disk leaves under each tree's root.
fn populate(engine: &Engine, blocks: &MemBlockStore, w: &Workload) -> Result<Vec<TreeId>> {
    let mut trees = Vec::with_capacity(w.trees);
    for i in 0..w.trees {
        let tree = engine.open_tree(&format!("table-{}", i), false);
        for _ in 0..w.pages_per_tree {
            let addr = blocks
                .write_page(w.page_size)
                .context("write initial page image")?;
            tree.new_ref(Some(0), RefFlags::empty(), Some(addr));
        }
        trees.push(tree.id());
    }
    Ok(trees)
}

/// One client thread: transactions of a single read or read-modify.
fn client(engine: &Engine, trees: &[TreeId], w: &Workload, deadline: Instant) -> OpStats {
    let mut rng = rand::thread_rng();
    let mut session = Session::new();
    let mut stats = OpStats::default();

    while Instant::now() < deadline {
        let tree = trees[rng.gen_range(0..trees.len())];
        let slot = rng.gen_range(1..=w.pages_per_tree as u32);
        let write = rng.gen_bool(w.write_ratio.clamp(0.0, 1.0));

        session.begin(engine.txn());
        match engine.assist_if_needed(&session, false, !write) {
            Ok(()) => {}
            Err(EvictError::RollbackRequired(reason)) => {
                stats.rollbacks += 1;
                warn!(component = "workload", event = "rollback", reason = reason);
                session.end(engine.txn());
                continue;
            }
            Err(err) => {
                warn!(component = "workload", event = "assist_failed", error = %err);
            }
        }

        let id = match engine.read_in(tree, slot) {
            Ok(id) => id,
            Err(EvictError::Busy) | Err(EvictError::PageNotFound) => {
                stats.busy += 1;
                session.end(engine.txn());
                continue;
            }
            Err(err) => {
                warn!(component = "workload", event = "read_failed", error = %err);
                session.end(engine.txn());
                continue;
            }
        };
        stats.reads += 1;

        let wont_need = rng.gen_bool(w.wont_need_ratio.clamp(0.0, 1.0));
        if engine.touch_page(id, wont_need).is_err() {
            stats.busy += 1;
        }
        if write {
            match engine.modify_page(&session, id, w.update_size) {
                Ok(()) => stats.writes += 1,
                Err(_) => stats.busy += 1,
            }
        }
        session.end(engine.txn());
    }
    stats
}

fn main() -> Result<()> {
    let args = Args::parse();

    let cfg = load_cfg(args.cfg)?;
    configure_logger(&cfg);

    let settings = cfg.settings().context("invalid eviction settings")?;
    let workload = cfg.workload();
    anyhow::ensure!(
        workload.trees > 0 && workload.pages_per_tree > 0,
        "workload needs at least one tree and one page per tree"
    );
    let threads = workload_threads(&workload);

    let blocks = Arc::new(MemBlockStore::new());
    let reconciler = Arc::new(StoreReconciler::new(blocks.clone()));
    let engine = Engine::configure(settings, reconciler, blocks.clone()).context("configure eviction")?;

    let trees = populate(&engine, &blocks, &workload)?;
    engine.start().context("start eviction workers")?;

    info!(
        component = "main",
        event = "workload_started",
        trees = workload.trees,
        pages_per_tree = workload.pages_per_tree,
        threads = threads,
        duration = ?workload.duration,
        "running workload"
    );

    let deadline = Instant::now() + workload.duration;
    let mut total = OpStats::default();
    thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| client(&engine, &trees, &workload, deadline)))
            .collect();
        for h in handles {
            match h.join() {
                Ok(stats) => total.merge(stats),
                Err(_) => warn!(component = "main", event = "client_panicked"),
            }
        }
    });

    // Let the pool drain below target before reporting.
    thread::sleep(Duration::from_millis(100));
    let stats = engine.stats();
    engine.stop();

    info!(
        component = "main",
        event = "workload_finished",
        reads = total.reads,
        writes = total.writes,
        busy = total.busy,
        rollbacks = total.rollbacks,
        inmem = stats.bytes.inmem,
        dirty = stats.bytes.dirty,
        updates = stats.bytes.updates,
        pages = stats.bytes.pages,
        progress = stats.progress,
        aggressive = stats.aggressive_score,
        workers = stats.workers,
        blocks = blocks.len(),
        "workload finished"
    );
    Ok(())
}
