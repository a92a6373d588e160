//! Append-only write-ahead log next to the snapshot file.
//!
//! Every acknowledged write is one JSON line, synced before the write is
//! applied in memory. Lines carry full record state, so replaying a line
//! twice (or over a snapshot that already has it) changes nothing.

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::warn;

use super::{CellRecord, Region, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(super) enum LogEntry {
    Cell(CellRecord),
    Region(Region),
}

pub(super) struct WriteAheadLog {
    file: Mutex<File>,
}

impl WriteAheadLog {
    /// Starts an empty log at `path`, replacing any previous one.
    pub async fn create(path: &Path) -> Result<Self, StoreError> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .await?
            .into_std()
            .await;
        file.sync_all()?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Appends one entry and syncs it to disk.
    pub fn append(&self, entry: &LogEntry) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock();
        let start = file.stream_position()?;
        if let Err(err) = file.write_all(&line).and_then(|()| file.sync_data()) {
            // cut the partial line so the next entry starts on a clean line
            if let Err(undo) = file.set_len(start).and_then(|()| file.seek(SeekFrom::Start(start)).map(drop)) {
                warn!(error = %undo, "could not roll back failed log append");
            }
            return Err(err.into());
        }
        Ok(())
    }

    pub fn sync(&self) -> Result<(), StoreError> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}

/// Log file used alongside the snapshot at `snapshot`.
pub(super) fn log_path(snapshot: &Path) -> PathBuf {
    let mut name = snapshot.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".log");
    snapshot.with_file_name(name)
}

/// Reads every intact entry of the log at `path`. A missing log is empty.
///
/// Lines that do not parse belong to writes that failed halfway and were
/// never acknowledged; they are skipped.
pub(super) async fn replay(path: &Path) -> Result<Vec<LogEntry>, StoreError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };

    let mut entries = Vec::new();
    for (lineno, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        match serde_json::from_slice(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(path = %path.display(), line = lineno + 1, error = %err, "skipping torn log line"),
        }
    }
    Ok(entries)
}
