//! Concurrent in-memory store, made durable by a snapshot plus a write-ahead log.

use std::{
    cmp::Reverse,
    collections::HashSet,
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::info;

use super::{
    CellRecord, CellStore, Region, RegionStore, StoreError,
    snapshot::{self, Snapshot},
    wal::{self, LogEntry, WriteAheadLog},
};
use crate::grid::CellId;

/// Cell table and region log held in memory.
///
/// Per-cell claims go through the `DashMap` entry lock, which makes each
/// upsert a single atomic read-modify-write. When opened with a path, each
/// write is appended and synced to the log before it is applied, so a
/// write that returned `Ok` survives a crash. [`MemoryStore::open`] folds
/// snapshot and log together into a fresh snapshot and starts a new log.
#[derive(Default)]
pub struct MemoryStore {
    cells: DashMap<CellId, CellRecord>,
    regions: RwLock<Vec<Region>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
    wal: Option<WriteAheadLog>,
}

impl MemoryStore {
    /// Store without a backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the store at `path`, recovering the snapshot and replaying the log.
    pub async fn open(path: Option<PathBuf>) -> Result<Self, StoreError> {
        let Some(path) = path else {
            info!("store opened without persistence");
            return Ok(Self::new());
        };

        let snapshot = snapshot::load(&path).await?.unwrap_or_default();
        let log_path = wal::log_path(&path);
        let replayed = wal::replay(&log_path).await?;
        let replayed_len = replayed.len();

        let cells: DashMap<CellId, CellRecord> =
            snapshot.cells.into_iter().map(|c| (c.cell_id, c)).collect();
        let mut regions = snapshot.regions;
        let mut region_ids: HashSet<String> = regions.iter().map(|r| r.id.clone()).collect();
        for entry in replayed {
            match entry {
                LogEntry::Cell(record) => {
                    let newer = cells
                        .get(&record.cell_id)
                        .is_none_or(|current| current.claim_seq < record.claim_seq);
                    if newer {
                        cells.insert(record.cell_id, record);
                    }
                }
                LogEntry::Region(region) => {
                    if region_ids.insert(region.id.clone()) {
                        regions.push(region);
                    }
                }
            }
        }

        let max_seq = cells.iter().map(|c| c.claim_seq + 1).max().unwrap_or(0);
        let next_seq = snapshot.next_seq.max(max_seq);

        // compact: the merged state becomes the snapshot, then the log restarts
        let compacted = Snapshot {
            next_seq,
            cells: cells.iter().map(|e| e.value().clone()).collect(),
            regions,
        };
        snapshot::save(&path, &compacted).await?;
        let wal = WriteAheadLog::create(&log_path).await?;

        info!(
            path = %path.display(),
            cells = compacted.cells.len(),
            regions = compacted.regions.len(),
            replayed = replayed_len,
            "store opened"
        );
        Ok(Self {
            cells,
            regions: RwLock::new(compacted.regions),
            next_seq: AtomicU64::new(next_seq),
            closed: AtomicBool::new(false),
            wal: Some(wal),
        })
    }

    /// Rejects further writes and syncs the log.
    pub fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(wal) = &self.wal {
            wal.sync()?;
        }
        info!("store closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() { Err(StoreError::Closed) } else { Ok(()) }
    }

    fn log(&self, entry: &LogEntry) -> Result<(), StoreError> {
        match &self.wal {
            Some(wal) => wal.append(entry),
            None => Ok(()),
        }
    }
}

impl CellStore for MemoryStore {
    fn claim(&self, cell_id: CellId, owner_id: &str, increment: u64) -> Result<CellRecord, StoreError> {
        self.ensure_open()?;
        let entry = self.cells.entry(cell_id);
        // timestamp and sequence are taken under the entry lock, so both
        // follow per-cell commit order
        let now = OffsetDateTime::now_utc();
        let claim_seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        match entry {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                let record = CellRecord {
                    cell_id,
                    owner_id: owner_id.to_string(),
                    control_score: current.control_score.saturating_add(increment),
                    last_claimed_at: now.max(current.last_claimed_at),
                    claim_seq,
                };
                self.log(&LogEntry::Cell(record.clone()))?;
                entry.insert(record.clone());
                Ok(record)
            }
            Entry::Vacant(entry) => {
                let record = CellRecord {
                    cell_id,
                    owner_id: owner_id.to_string(),
                    control_score: increment,
                    last_claimed_at: now,
                    claim_seq,
                };
                self.log(&LogEntry::Cell(record.clone()))?;
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    fn recent_cells(&self, limit: usize) -> Result<Vec<CellRecord>, StoreError> {
        let mut records: Vec<CellRecord> = self.cells.iter().map(|e| e.value().clone()).collect();
        records.sort_unstable_by_key(|r| Reverse((r.last_claimed_at, r.claim_seq)));
        records.truncate(limit);
        Ok(records)
    }
}

impl RegionStore for MemoryStore {
    fn append_region(&self, region: Region) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut regions = self.regions.write();
        self.log(&LogEntry::Region(region.clone()))?;
        regions.push(region);
        Ok(())
    }

    fn recent_regions(&self, limit: usize) -> Result<Vec<Region>, StoreError> {
        let regions = self.regions.read();
        Ok(regions.iter().rev().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use serde_json::json;

    use super::*;
    use crate::grid::{GeoPoint, RESOLUTION, cell_for};

    fn cell(lat: f64, lon: f64) -> CellId {
        cell_for(GeoPoint::new(lat, lon), RESOLUTION).unwrap()
    }

    fn region(id: &str) -> Region {
        Region {
            id: id.to_string(),
            user_id: "alice".into(),
            polygon: json!([[51.5, -0.1], [51.6, -0.1], [51.6, 0.0]]),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn first_claim_creates_then_accumulates_and_reassigns() {
        let store = MemoryStore::new();
        let id = cell(51.5, -0.1);

        let first = store.claim(id, "alice", 10).unwrap();
        assert_eq!(first.owner_id, "alice");
        assert_eq!(first.control_score, 10);

        let second = store.claim(id, "bob", 10).unwrap();
        assert_eq!(second.owner_id, "bob");
        assert_eq!(second.control_score, 20);
        assert!(second.claim_seq > first.claim_seq);
        assert!(second.last_claimed_at >= first.last_claimed_at);
    }

    #[test]
    fn score_saturates() {
        let store = MemoryStore::new();
        let id = cell(0.0, 0.0);
        store.claim(id, "alice", u64::MAX - 1).unwrap();
        let record = store.claim(id, "alice", 10).unwrap();
        assert_eq!(record.control_score, u64::MAX);
    }

    #[test]
    fn recent_cells_follow_commit_order() {
        let store = MemoryStore::new();
        let (a, b, c) = (cell(10.0, 10.0), cell(20.0, 20.0), cell(30.0, 30.0));
        for id in [a, b, c] {
            store.claim(id, "alice", 10).unwrap();
        }
        let ids: Vec<CellId> = store.recent_cells(2).unwrap().iter().map(|r| r.cell_id).collect();
        assert_eq!(ids, vec![c, b]);
    }

    #[test]
    fn concurrent_claims_on_one_cell_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let id = cell(48.8566, 2.3522);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let owner = format!("user-{t}");
                    let mut last = None;
                    for _ in 0..250 {
                        let record = store.claim(id, &owner, 10).unwrap();
                        // this thread's own commits never see time go backwards
                        if let Some(prev) = last {
                            assert!(record.last_claimed_at >= prev);
                        }
                        last = Some(record.last_claimed_at);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let records = store.recent_cells(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].control_score, 8 * 250 * 10);
    }

    #[test]
    fn regions_are_listed_newest_first() {
        let store = MemoryStore::new();
        for id in ["poly_a", "poly_b", "poly_c"] {
            store.append_region(region(id)).unwrap();
        }
        let ids: Vec<String> = store.recent_regions(2).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["poly_c", "poly_b"]);
    }

    #[test]
    fn writes_fail_after_close() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(store.claim(cell(1.0, 1.0), "alice", 10), Err(StoreError::Closed)));
        assert!(matches!(store.append_region(region("poly_x")), Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn acknowledged_writes_survive_a_crash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("territory.json");
        let id = cell(51.5, -0.1);

        let store = MemoryStore::open(Some(path.clone())).await.unwrap();
        store.claim(id, "alice", 10).unwrap();
        store.claim(id, "bob", 10).unwrap();
        store.append_region(region("poly_1")).unwrap();
        // no close(): the process dies here
        drop(store);

        let reopened = MemoryStore::open(Some(path)).await.unwrap();
        let cells = reopened.recent_cells(500).unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].owner_id, "bob");
        assert_eq!(cells[0].control_score, 20);
        assert_eq!(reopened.recent_regions(500).unwrap().len(), 1);

        // sequence numbers keep increasing across restarts
        let next = reopened.claim(cell(0.0, 0.0), "carol", 10).unwrap();
        assert!(next.claim_seq > cells[0].claim_seq);
    }

    #[tokio::test]
    async fn repeated_restarts_do_not_duplicate_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("territory.json");

        let store = MemoryStore::open(Some(path.clone())).await.unwrap();
        store.claim(cell(10.0, 10.0), "alice", 10).unwrap();
        store.append_region(region("poly_1")).unwrap();
        store.close().unwrap();
        drop(store);

        for _ in 0..3 {
            let store = MemoryStore::open(Some(path.clone())).await.unwrap();
            assert_eq!(store.recent_cells(500).unwrap()[0].control_score, 10);
            assert_eq!(store.recent_regions(500).unwrap().len(), 1);
        }
    }
}
