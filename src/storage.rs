use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::decoder::{self, flatten_one_level};
use crate::error::{Error, Result};
use crate::model::Record;

/// The on-disk history: one JSON array, newest first.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a reader only ever sees a complete document.
#[derive(Debug)]
pub struct HistoryFile {
    pub file_path: PathBuf,
    tmp_path: PathBuf,
    strict: bool,
}

impl HistoryFile {
    /// Opens the file, creating it as `[]` (and any missing parent directory) if absent.
    pub fn open(path: &Path, strict: bool) -> Result<Self> {
        let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        tmp_name.push(".tmp");

        let file = Self {
            file_path: path.to_path_buf(),
            tmp_path: path.with_file_name(tmp_name),
            strict,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::persistence(parent, e))?;
        }
        if !path.exists() {
            file.write::<Value>(&[])?;
        }
        Ok(file)
    }

    /// Reads the whole history, splicing any legacy nested batches.
    ///
    /// Entries that are not objects are skipped here but stay on disk;
    /// [`HistoryFile::read_raw`] still returns them.
    pub fn read(&self) -> Result<Vec<Record>> {
        let entries = self.read_raw()?;
        let mut records = Vec::with_capacity(entries.len());
        for (i, entry) in entries.into_iter().enumerate() {
            match decoder::into_record(entry) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %self.file_path.display(), entry = i, "skipping unreadable history entry: {}", e),
            }
        }
        Ok(records)
    }

    /// Reads the history as plain JSON, one level flattened, nothing dropped.
    pub fn read_raw(&self) -> Result<Vec<Value>> {
        let handle = match File::open(&self.file_path) {
            Ok(f) => f,
            // Removed out from under us: same as an empty history.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(&self.file_path, e)),
        };

        let entries: Vec<Value> = serde_json::from_reader(BufReader::new(handle)).map_err(|e| {
            if e.is_io() {
                Error::persistence(&self.file_path, e.into())
            } else {
                Error::CorruptHistory { path: self.file_path.clone(), source: e }
            }
        })?;
        Ok(flatten_one_level(entries))
    }

    /// Replaces the history with `entries`.
    pub fn write<T: Serialize>(&self, entries: &[T]) -> Result<()> {
        if let Err(e) = self.write_tmp(entries) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(Error::persistence(&self.tmp_path, e));
        }
        fs::rename(&self.tmp_path, &self.file_path).map_err(|e| {
            let _ = fs::remove_file(&self.tmp_path);
            Error::persistence(&self.file_path, e)
        })
    }

    fn write_tmp<T: Serialize>(&self, entries: &[T]) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.tmp_path)?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, entries)?;
        writer.flush()?;

        if self.strict {
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}
