use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Durable key-value byte sink used for snapshots.
pub trait KvStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    fn save(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()>;
}

/// One file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    pub data_dir: PathBuf,
}

impl FileKvStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened datastore");
        Ok(Self { data_dir })
    }

    pub fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{key}.json")))
    }
}

impl KvStore for FileKvStore {
    #[tracing::instrument(skip(self))]
    fn load(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            debug!(file = %path.display(), "no snapshot on disk");
            return Ok(None);
        }

        let bytes =
            fs::read(&path).with_context(|| format!("failed reading {}", path.display()))?;
        debug!(file = %path.display(), bytes = bytes.len(), "read snapshot");
        Ok(Some(bytes))
    }

    #[tracing::instrument(skip(self, bytes))]
    fn save(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        debug!(file = %path.display(), bytes = bytes.len(), "saving snapshot atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(bytes)?;
        temp.flush()?;

        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

        Ok(())
    }
}

/// In-process store; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, Vec<u8>>,
    writes: u64,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(key: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let store = Self::default();
        store.inner.lock().entries.insert(key.to_string(), bytes.into());
        store
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Number of successful `save` calls so far.
    pub fn writes(&self) -> u64 {
        self.inner.lock().writes
    }
}

impl KvStore for MemoryKvStore {
    fn load(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        inner.entries.insert(key.to_string(), bytes.to_vec());
        inner.writes += 1;
        Ok(())
    }
}

fn validate_key(key: &str) -> anyhow::Result<()> {
    if key.trim().is_empty() {
        return Err(anyhow!("storage key cannot be empty"));
    }
    if key.contains(['/', '\\']) || key.starts_with('.') {
        return Err(anyhow!(
            "storage key `{key}` must be a plain name without path separators"
        ));
    }
    Ok(())
}
