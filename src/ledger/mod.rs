//! Territory ledger: turns trails into cell claims and reports cell state.
//!
//! Every claim hands the cell to the newest claimant and adds
//! [`INCREMENT`] to a score that is shared by all of the cell's owners
//! over time. The score therefore counts total claims ever made on the
//! cell, not the current owner's hold on it. A per-owner score (or a reset
//! on ownership change) would be the stricter model; the cumulative one is
//! what existing clients see.

use std::{collections::HashSet, sync::Arc};

use tracing::{debug, warn};

use crate::{
    grid::{self, CellId, GeoPoint, RESOLUTION},
    store::{CellRecord, CellStore, StoreError},
};

/// Score added to a cell for every claim.
pub const INCREMENT: u64 = 10;

/// Smallest trail accepted.
pub const MIN_TRAIL_POINTS: usize = 3;

/// Cap on `list_recent`.
pub const MAX_LIST: usize = 500;

#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// Cells captured by one submission, deduplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimResult {
    pub cells: Vec<CellId>,
    pub captured: usize,
}

#[derive(Clone)]
pub struct TerritoryLedger {
    store: Arc<dyn CellStore>,
}

impl TerritoryLedger {
    pub fn new(store: Arc<dyn CellStore>) -> Self {
        Self { store }
    }

    /// Claims every cell `points` passes through for `user_id`.
    ///
    /// Each cell is claimed once per submission however many points fall
    /// in it. Cells are applied one at a time; if the store fails midway the
    /// cells already applied stay applied and the whole call fails.
    pub fn submit_trail(&self, user_id: &str, points: &[GeoPoint]) -> Result<ClaimResult, LedgerError> {
        if user_id.trim().is_empty() {
            return Err(LedgerError::InvalidInput("user_id is empty".into()));
        }
        if points.len() < MIN_TRAIL_POINTS {
            return Err(LedgerError::InvalidInput(format!(
                "trail needs at least {MIN_TRAIL_POINTS} points, got {}",
                points.len()
            )));
        }

        let cells = unique_cells(points)?;
        for (applied, cell) in cells.iter().enumerate() {
            if let Err(err) = self.store.claim(*cell, user_id, INCREMENT) {
                warn!(%user_id, applied, total = cells.len(), error = %err, "trail claim aborted");
                return Err(err.into());
            }
        }
        debug!(%user_id, points = points.len(), cells = cells.len(), "trail claimed");

        let captured = cells.len();
        Ok(ClaimResult { cells, captured })
    }

    /// Most recently claimed cells first, at most `min(limit, MAX_LIST)`.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<CellRecord>, LedgerError> {
        Ok(self.store.recent_cells(limit.min(MAX_LIST))?)
    }
}

/// Maps points to cells, keeping the first occurrence of each cell.
fn unique_cells(points: &[GeoPoint]) -> Result<Vec<CellId>, LedgerError> {
    let mut seen = HashSet::with_capacity(points.len());
    let mut cells = Vec::new();
    for (i, point) in points.iter().enumerate() {
        let cell = grid::cell_for(*point, RESOLUTION)
            .map_err(|e| LedgerError::InvalidInput(format!("point {i}: {e}")))?;
        if seen.insert(cell) {
            cells.push(cell);
        }
    }
    Ok(cells)
}
