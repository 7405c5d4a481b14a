//! Dedup index and identifier locks shared by everything in the process that
//! uses the same storage location.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use tokio::sync::Mutex;

use super::{DedupIndex, KeyedLocks};
use crate::error::StoreError;

static OPEN: LazyLock<Mutex<HashMap<PathBuf, Weak<SharedStorage>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// The index and lock table for one storage location.
///
/// Opening the same index path twice, through any spelling of it, yields the
/// same value for as long as one holder keeps it alive.
#[derive(Debug)]
pub struct SharedStorage {
    index: DedupIndex,
    locks: Arc<KeyedLocks>,
}

impl SharedStorage {
    /// Join the storage at `index_path`, loading the index if nobody in this
    /// process has it open.
    pub async fn open(index_path: &Path) -> Result<Arc<Self>, StoreError> {
        let key = location_key(index_path).await?;

        let mut open = OPEN.lock().await;
        if let Some(existing) = open.get(&key).and_then(Weak::upgrade) {
            tracing::debug!(path = %key.display(), "joined open storage");
            return Ok(existing);
        }

        let storage = Arc::new(Self {
            index: DedupIndex::open(index_path).await?,
            locks: Arc::new(KeyedLocks::new()),
        });
        open.retain(|_, held| held.strong_count() > 0);
        open.insert(key, Arc::downgrade(&storage));
        Ok(storage)
    }

    /// Dedup index.
    #[must_use]
    pub const fn index(&self) -> &DedupIndex {
        &self.index
    }

    /// Per-identifier locks.
    #[must_use]
    pub const fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }
}

/// Canonical location of the index file. Creates its directory.
async fn location_key(index_path: &Path) -> Result<PathBuf, StoreError> {
    let dir = index_path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(|e| StoreError::io(dir, e))?;
    let dir = tokio::fs::canonicalize(dir).await.map_err(|e| StoreError::io(dir, e))?;
    Ok(match index_path.file_name() {
        Some(name) => dir.join(name),
        None => dir,
    })
}
