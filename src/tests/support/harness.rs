// Scenario test harness: an engine over an in-memory block store.

use std::sync::{Arc, Once};
use std::time::Duration;

use crate::backend::memory::{MemBlockStore, StoreReconciler};
use crate::backend::BlockManager;
use crate::engine::Engine;
use crate::error::Result;
use crate::evict::{ClassPct, EvictionSettings, TuningSettings};
use crate::page::{PageId, PageKind, RefFlags};
use crate::tree::Tree;

static LOGGING: Once = Once::new();

/// Routes tracing output through the test writer, once per process.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("warn"))
            .with_test_writer()
            .try_init();
    });
}

/// Default classes, one or two workers and short timeouts.
pub fn settings(cache_size: u64) -> EvictionSettings {
    EvictionSettings::new(
        ClassPct::default_targets(),
        ClassPct::default_triggers(),
        1,
        2,
        Duration::from_secs(5),
    )
    .expect("valid settings")
    .with_cache_size(cache_size)
    .with_assist_timeout(Duration::from_millis(500))
    .with_stats_interval(Duration::from_millis(100))
    .with_tuning(TuningSettings {
        period: Duration::from_millis(20),
        force_retune: Duration::from_secs(1),
        datapoints_min: 2,
        batch: 1,
    })
}

pub struct TestEngine {
    pub engine: Engine,
    pub blocks: Arc<MemBlockStore>,
    pub reconciler: Arc<StoreReconciler>,
}

impl TestEngine {
    pub fn new(settings: EvictionSettings) -> Self {
        init_test_logging();
        let blocks = Arc::new(MemBlockStore::new());
        let reconciler = Arc::new(StoreReconciler::new(blocks.clone()));
        let engine = Engine::configure(settings, reconciler.clone(), blocks.clone()).expect("configure");
        Self {
            engine,
            blocks,
            reconciler,
        }
    }

    /// Adds an on-disk leaf of `size` bytes under `parent` and reads it in.
    pub fn leaf(&self, tree: &Tree, parent: u32, size: u64) -> Result<PageId> {
        let addr = self.blocks.write_page(size).expect("write block");
        let slot = tree.new_ref(Some(parent), RefFlags::empty(), Some(addr));
        self.engine.read_in(tree.id(), slot)
    }

    /// Adds `n` clean leaves of `size` bytes under the root.
    pub fn leaves(&self, tree: &Tree, n: usize, size: u64) -> Vec<PageId> {
        (0..n).map(|_| self.leaf(tree, 0, size).expect("read in")).collect()
    }

    /// Creates an internal page under the root.
    pub fn internal(&self, tree: &Tree, size: u64) -> PageId {
        self.engine
            .create_page(tree.id(), Some(0), PageKind::Internal, size)
            .expect("create internal")
    }

    /// Whether the page behind `id` is still resident.
    pub fn resident(&self, id: PageId) -> bool {
        self.engine.page(id).is_ok()
    }
}
