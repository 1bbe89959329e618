//! Key-value persistence port and its implementations.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::error::{EscrowError, EscrowResult};

/// Minimal store the orchestrator persists through.
///
/// No multi-key atomicity: callers write every key of a step before
/// reporting that step as done.
pub trait KeyValueStore: Send + Sync {
    fn put(&self, key: &str, value: &str) -> EscrowResult<()>;
    fn get(&self, key: &str) -> EscrowResult<Option<String>>;
    fn clear(&self) -> EscrowResult<()>;
}

/// Process-local store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> EscrowResult<()> {
        self.inner.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> EscrowResult<Option<String>> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    fn clear(&self) -> EscrowResult<()> {
        self.inner.clear();
        Ok(())
    }
}

/// JSON object on disk, rewritten in full on every mutation.
#[derive(Clone)]
pub struct FileStore {
    path: PathBuf,
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl FileStore {
    /// Open `path`, loading existing entries if the file is present.
    pub fn open(path: impl AsRef<Path>) -> EscrowResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut entries = BTreeMap::new();

        if path.exists() {
            let file = File::open(&path).map_err(io_error(&path))?;
            entries = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
                EscrowError::Persistence(format!("Corrupt state file {}: {}", path.display(), e))
            })?;
            tracing::debug!(path = %path.display(), keys = entries.len(), "Loaded state file");
        }

        Ok(Self {
            path,
            entries: Arc::new(Mutex::new(entries)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> EscrowResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| EscrowError::Persistence("state store lock poisoned".to_string()))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> EscrowResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_error(parent))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        let file = File::create(&tmp).map_err(io_error(&tmp))?;
        serde_json::to_writer_pretty(BufWriter::new(file), entries)
            .map_err(|e| EscrowError::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path).map_err(io_error(&self.path))
    }
}

impl KeyValueStore for FileStore {
    fn put(&self, key: &str, value: &str) -> EscrowResult<()> {
        let mut entries = self.lock()?;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn get(&self, key: &str) -> EscrowResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn clear(&self) -> EscrowResult<()> {
        let mut entries = self.lock()?;
        self.flush(&BTreeMap::new())?;
        entries.clear();
        Ok(())
    }
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> EscrowError + '_ {
    move |e| EscrowError::Persistence(format!("{}: {}", path.display(), e))
}
