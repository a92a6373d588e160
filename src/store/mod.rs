//! Persistence contract for the territory table and the region log.

mod memory;
mod snapshot;
mod wal;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::grid::CellId;

pub use memory::MemoryStore;

/// Current ownership and score of one claimed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub cell_id: CellId,
    pub owner_id: String,
    pub control_score: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_claimed_at: OffsetDateTime,
    /// Store-wide commit order of the latest claim.
    pub claim_seq: u64,
}

/// A raw polygon submitted by a user. The polygon is kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub user_id: String,
    pub polygon: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),
    #[error("store format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Keyed cell table with an atomic "insert or accumulate-and-reassign".
pub trait CellStore: Send + Sync {
    /// Creates the record with `increment` as its score, or adds `increment`
    /// to the existing score and hands the cell to `owner_id`. The whole
    /// read-modify-write, including stamping `last_claimed_at`, is atomic
    /// with respect to other claims on the cell. An `Ok` return means the
    /// write is durable.
    fn claim(&self, cell_id: CellId, owner_id: &str, increment: u64) -> Result<CellRecord, StoreError>;

    /// Most recently claimed records first, at most `limit` of them.
    fn recent_cells(&self, limit: usize) -> Result<Vec<CellRecord>, StoreError>;
}

/// Append-only log of submitted regions.
pub trait RegionStore: Send + Sync {
    /// Durable once it returns `Ok`.
    fn append_region(&self, region: Region) -> Result<(), StoreError>;

    /// Newest regions first, at most `limit` of them.
    fn recent_regions(&self, limit: usize) -> Result<Vec<Region>, StoreError>;
}
