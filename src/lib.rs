#[path = "shared/backoff/mod.rs"]
pub mod backoff;
#[cfg(test)]
mod tests;

#[cfg(test)]
pub use tests::support;

pub mod backend;
pub mod bucket;
pub mod config;
pub mod engine;
pub mod error;
pub mod evict;
pub mod page;
pub mod tree;
pub mod txn;
pub mod workers;

pub use engine::{Engine, EngineStats};
pub use error::{ConfigError, EvictError};
