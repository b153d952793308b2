//! Append-only journal of detected changes.

use crate::error::SyncResult;
use dirsync_protocol::RawRecord;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink receiving every classified node or link change as received.
pub trait ChangeJournal: Send + Sync {
    /// Appends one change.
    fn append(&self, record: &RawRecord) -> SyncResult<()>;
}

/// Writes each change as one JSON line to a file.
#[derive(Debug)]
pub struct JsonLinesJournal {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesJournal {
    /// Opens `path` for appending, creating it if missing.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChangeJournal for JsonLinesJournal {
    fn append(&self, record: &RawRecord) -> SyncResult<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, record).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

/// Collects changes in memory.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<RawRecord>>,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes appended so far.
    pub fn records(&self) -> Vec<RawRecord> {
        self.records.lock().clone()
    }
}

impl ChangeJournal for MemoryJournal {
    fn append(&self, record: &RawRecord) -> SyncResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

impl<J: ChangeJournal + ?Sized> ChangeJournal for std::sync::Arc<J> {
    fn append(&self, record: &RawRecord) -> SyncResult<()> {
        (**self).append(record)
    }
}
