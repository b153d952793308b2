//! Persistence of the continuation token across restarts.

use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Durable home of the continuation token.
pub trait ContinuationStore: Send {
    /// Reads the persisted token; `None` means start a full sync.
    fn read(&self) -> SyncResult<Option<String>>;

    /// Persists `token`, replacing the previous one.
    fn save(&self, token: &str) -> SyncResult<()>;
}

impl<S: ContinuationStore + Sync + ?Sized> ContinuationStore for std::sync::Arc<S> {
    fn read(&self) -> SyncResult<Option<String>> {
        (**self).read()
    }

    fn save(&self, token: &str) -> SyncResult<()> {
        (**self).save(token)
    }
}

/// In-memory continuation store.
///
/// Keeps every saved token so tests can check the advance order.
#[derive(Debug, Default)]
pub struct MemoryContinuationStore {
    history: RwLock<Vec<String>>,
}

impl MemoryContinuationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store already holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            history: RwLock::new(vec![token.into()]),
        }
    }

    /// Every token saved, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.history.read().clone()
    }
}

impl ContinuationStore for MemoryContinuationStore {
    fn read(&self) -> SyncResult<Option<String>> {
        Ok(self.history.read().last().cloned())
    }

    fn save(&self, token: &str) -> SyncResult<()> {
        self.history.write().push(token.to_string());
        Ok(())
    }
}

/// File-backed continuation store.
///
/// Saves go through a sibling temporary file and a rename so a crash never
/// leaves a truncated token behind.
#[derive(Debug, Clone)]
pub struct FileContinuationStore {
    path: PathBuf,
}

impl FileContinuationStore {
    /// Creates a store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the token file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes the persisted token, forcing a full sync on next start.
    pub fn clear(&self) -> SyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ContinuationStore for FileContinuationStore {
    fn read(&self) -> SyncResult<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Store(format!(
                "failed to read continuation token from {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, token: &str) -> SyncResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, token)?;
        fs::rename(&temp, &self.path).map_err(|e| {
            SyncError::Store(format!(
                "failed to persist continuation token to {}: {e}",
                self.path.display()
            ))
        })
    }
}
