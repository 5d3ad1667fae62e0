// Package backend exposes the collaborator interfaces used by eviction.

pub mod memory;

use thiserror::Error;

use crate::page::Page;
use crate::tree::TreeId;

pub use memory::{MemBlockStore, StoreReconciler};

/// Opaque on-disk address handed out by the block manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockAddr(pub u64);

/// Failure reported by reconciliation or storage I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("block write failed: {0}")]
    Write(String),
    #[error("page image rejected: {0}")]
    Rejected(String),
}

/// Outcome of a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileResult {
    /// New on-disk location, or `None` when the page reconciled to nothing.
    pub addr: Option<BlockAddr>,
    /// Bytes written for the image.
    pub written: u64,
    /// Reconciliation could not write everything (e.g. updates too new).
    pub still_dirty: bool,
}

/// Block manager interface: the only storage I/O eviction performs.
pub trait BlockManager: Send + Sync {
    /// Reads the page image at `addr`, returning its size in bytes.
    fn read_page(&self, addr: BlockAddr) -> Result<u64, ReconcileError>;

    /// Writes a page image of `size` bytes and returns its address.
    fn write_page(&self, size: u64) -> Result<BlockAddr, ReconcileError>;

    /// Releases a block that no longer backs any page.
    fn free_block(&self, addr: BlockAddr);
}

/// Turns a dirty in-memory page into an on-disk image.
///
/// Called with the page's reference locked by the evicting thread.
pub trait Reconciler: Send + Sync {
    fn reconcile(&self, tree: TreeId, page: &Page) -> Result<ReconcileResult, ReconcileError>;
}
