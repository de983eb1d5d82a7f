use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{Record, HISTORY_CAPACITY};
use crate::storage::HistoryFile;

/// Bounded, newest-first history of well records.
///
/// The file is the source of truth: every merge is a read-modify-write of the
/// whole document. Merges and resets are serialized by one lock, so a merge
/// can never read the pre-reset history and write it back afterwards.
/// Snapshots skip the lock entirely; the file is replaced by rename, so they
/// see the state either before or after a write.
#[derive(Debug)]
pub struct HistoryStore {
    file: HistoryFile,
    capacity: usize,
    // Held across the whole read-modify-write. Guards the current epoch.
    writer: Mutex<u64>,
    epoch: AtomicU64,
}

impl HistoryStore {
    pub fn open(path: &Path, strict_durability: bool) -> Result<Self> {
        Self::with_capacity(path, strict_durability, HISTORY_CAPACITY)
    }

    pub(crate) fn with_capacity(path: &Path, strict_durability: bool, capacity: usize) -> Result<Self> {
        let file = HistoryFile::open(path, strict_durability)?;
        Ok(Self {
            file,
            capacity,
            writer: Mutex::new(0),
            epoch: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file.file_path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resets since the store was opened.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Prepends `records` (keeping their order) and truncates to capacity.
    ///
    /// Returns the resulting history length. On error nothing was written.
    pub fn merge(&self, records: Vec<Record>) -> Result<usize> {
        let epoch = self.writer.lock().map_err(|_| Error::LockPoisoned)?;

        // Raw entries: anything that does not type as a Record is carried forward.
        let existing = self.file.read_raw()?;
        let incoming = records.len();

        let mut history = records
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()
            .map_err(|e| Error::MalformedPayload(e.to_string()))?;
        history.extend(existing);
        history.truncate(self.capacity);

        self.file.write(&history)?;

        info!(
            incoming,
            history = history.len(),
            epoch = *epoch,
            "merged batch into history"
        );
        Ok(history.len())
    }

    /// Full current history, newest first.
    pub fn snapshot(&self) -> Result<Vec<Record>> {
        self.file.read()
    }

    /// Empties the history and starts a new epoch.
    ///
    /// Waits for any in-flight merge, so once this returns no merge that read
    /// the old history can still write.
    pub fn reset(&self) -> Result<u64> {
        let mut epoch = self.writer.lock().map_err(|_| Error::LockPoisoned)?;

        self.file.write::<Value>(&[])?;

        *epoch += 1;
        self.epoch.store(*epoch, Ordering::Release);
        warn!(epoch = *epoch, path = %self.file.file_path.display(), "history reset");
        Ok(*epoch)
    }
}
