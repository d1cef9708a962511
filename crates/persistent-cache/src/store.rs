//! Storage backends
//!
//! A store maps each [`CacheKey`] to one [`CacheRecord`] holding both the
//! stored result and its access time, so a value can never exist without a
//! timestamp or the other way round.

use crate::error::{CacheError, Result};
use crate::key::CacheKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// On-disk snapshot layout version
const SNAPSHOT_VERSION: u32 = 1;

/// A stored result together with the time it was last read or written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub value: Value,
    /// Seconds since the Unix epoch
    pub accessed_at: f64,
}

/// Key-value persistence used by the cache
pub trait Store {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;

    fn contains(&self, key: &CacheKey) -> Result<bool>;

    /// Insert or overwrite the record under `key`
    fn insert(&mut self, key: CacheKey, record: CacheRecord) -> Result<()>;

    /// Update the access time of an existing record. Returns false, and
    /// creates nothing, when `key` is absent.
    fn touch(&mut self, key: &CacheKey, accessed_at: f64) -> Result<bool>;

    /// Returns whether a record was removed
    fn remove(&mut self, key: &CacheKey) -> Result<bool>;

    /// Every key with its access time
    fn access_times(&self) -> Result<Vec<(CacheKey, f64)>>;

    fn len(&self) -> Result<usize>;

    fn clear(&mut self) -> Result<()>;

    /// Make every earlier write durable
    fn flush(&mut self) -> Result<()>;

    /// Final flush at the end of a session. A failure is reported here and
    /// nowhere else.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    fn keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self.access_times()?.into_iter().map(|(key, _)| key).collect())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Non-durable store; everything is lost when it is dropped
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<CacheKey, CacheRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn insert(&mut self, key: CacheKey, record: CacheRecord) -> Result<()> {
        self.records.insert(key, record);
        Ok(())
    }

    fn touch(&mut self, key: &CacheKey, accessed_at: f64) -> Result<bool> {
        match self.records.get_mut(key) {
            Some(record) => {
                record.accessed_at = accessed_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }

    fn access_times(&self) -> Result<Vec<(CacheKey, f64)>> {
        Ok(self
            .records
            .iter()
            .map(|(key, record)| (key.clone(), record.accessed_at))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    entries: &'a BTreeMap<CacheKey, CacheRecord>,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    entries: BTreeMap<CacheKey, CacheRecord>,
}

/// Store backed by a single JSON snapshot file.
///
/// Records live in memory between flushes. A flush writes the whole snapshot
/// to a temporary file next to the target and renames it into place, so a
/// crash mid-write leaves the previous snapshot intact. Sessions that never
/// mutate anything never rewrite the file. Dropping a store with unflushed
/// changes attempts one last flush.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    records: BTreeMap<CacheKey, CacheRecord>,
    dirty: bool,
}

impl FileStore {
    /// Open the snapshot at `path`, or start an empty one that is created on
    /// the first flush. An existing zero-length file counts as an empty cache
    /// and is only rewritten once something changes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let (records, dirty) = match fs::read(&path) {
            Ok(data) if data.is_empty() => (BTreeMap::new(), false),
            Ok(data) => (Self::decode(&data)?, false),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "No cache snapshot yet, starting empty");
                (BTreeMap::new(), true)
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = ?path, entries = records.len(), "Opened cache store");
        Ok(Self {
            path,
            records,
            dirty,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether there are changes not yet written to disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn decode(data: &[u8]) -> Result<BTreeMap<CacheKey, CacheRecord>> {
        let snapshot: Snapshot =
            serde_json::from_slice(data).map_err(|e| CacheError::CorruptStore(e.to_string()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(CacheError::CorruptStore(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(snapshot.entries)
    }

    fn write_snapshot(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(
            &mut tmp,
            &SnapshotRef {
                version: SNAPSHOT_VERSION,
                entries: &self.records,
            },
        )?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;
        Ok(())
    }
}

impl Store for FileStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.records.get(key).cloned())
    }

    fn contains(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.records.contains_key(key))
    }

    fn insert(&mut self, key: CacheKey, record: CacheRecord) -> Result<()> {
        self.records.insert(key, record);
        self.dirty = true;
        Ok(())
    }

    fn touch(&mut self, key: &CacheKey, accessed_at: f64) -> Result<bool> {
        match self.records.get_mut(key) {
            Some(record) => {
                record.accessed_at = accessed_at;
                self.dirty = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, key: &CacheKey) -> Result<bool> {
        let removed = self.records.remove(key).is_some();
        self.dirty |= removed;
        Ok(removed)
    }

    fn access_times(&self) -> Result<Vec<(CacheKey, f64)>> {
        Ok(self
            .records
            .iter()
            .map(|(key, record)| (key.clone(), record.accessed_at))
            .collect())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.write_snapshot()?;
        self.dirty = false;
        debug!(path = ?self.path, entries = self.records.len(), "Flushed cache store");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let result = self.flush();
        // Drop must not retry and report the same failure a second time
        self.dirty = false;
        result
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                warn!(path = ?self.path, error = %e, "Failed to flush cache store on drop");
            }
        }
    }
}
