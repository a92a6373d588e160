//! JSON snapshot file backing the in-memory store.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{CellRecord, Region, StoreError};

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct Snapshot {
    pub next_seq: u64,
    pub cells: Vec<CellRecord>,
    pub regions: Vec<Region>,
}

/// Reads the snapshot at `path`. A missing file is an empty store.
pub(super) async fn load(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Writes the snapshot next to `path` and renames it into place.
pub(super) async fn save(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec(snapshot)?;
    let tmp = temp_path(path);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_creates_parent_dirs_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db").join("territory.json");
        save(&path, &Snapshot { next_seq: 7, ..Default::default() }).await.unwrap();

        let loaded = load(&path).await.unwrap().unwrap();
        assert_eq!(loaded.next_seq, 7);
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("territory.json");
        fs::write(&path, b"{not json").await.unwrap();
        assert!(matches!(load(&path).await, Err(StoreError::Format(_))));
    }
}
