//! Engine-internal result codes for the eviction subsystem.

use thiserror::Error;

use crate::backend::ReconcileError;

/// Configuration rejected by `EvictionSettings::validate`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be within (0, 100], got {value}")]
    PercentOutOfRange { name: &'static str, value: f64 },
    #[error("{class} trigger {trigger} is below its target {target}")]
    TriggerBelowTarget {
        class: &'static str,
        target: f64,
        trigger: f64,
    },
    #[error("eviction threads_min must be at least 1")]
    ZeroWorkerMin,
    #[error("eviction threads_max {max} is below threads_min {min}")]
    WorkerMaxBelowMin { min: usize, max: usize },
    #[error("cache size must be non-zero")]
    ZeroCacheSize,
}

#[derive(Error, Debug)]
pub enum EvictError {
    /// The page or tree is owned by someone else right now; move on.
    #[error("resource busy")]
    Busy,
    /// No eviction candidate was found in this pass.
    #[error("no eviction candidate found")]
    NotFound,
    #[error("reconciliation failed")]
    Reconcile(#[source] ReconcileError),
    /// The calling transaction must roll back so eviction can make progress.
    #[error("transaction rollback required: {0}")]
    RollbackRequired(&'static str),
    #[error("allocation failed")]
    OutOfMemory,
    #[error("eviction consistency check failed: {0}")]
    Consistency(String),
    #[error("invalid configuration")]
    Config(#[from] ConfigError),
    #[error("tree not found")]
    TreeNotFound,
    #[error("page not found")]
    PageNotFound,
    #[error("failed to spawn eviction thread")]
    Spawn(#[source] std::io::Error),
}

impl EvictError {
    /// Expected codes that a caller retries or skips past within the same pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, EvictError::Busy | EvictError::NotFound)
    }
}

pub type Result<T, E = EvictError> = std::result::Result<T, E>;
