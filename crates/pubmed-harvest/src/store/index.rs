//! Persistent record of fully processed papers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;

use super::write_atomic;
use crate::error::StoreError;
use crate::models::PaperRecord;

/// PMID to last `Done` record, mirrored to a JSON file.
///
/// The file is rewritten whole on every update, through a temporary sibling
/// and a rename, after merging in whatever the file holds at that moment.
/// Updates are serialized by the inner lock. Within one process, share a
/// single instance per path through [`SharedStorage`](super::SharedStorage).
#[derive(Debug)]
pub struct DedupIndex {
    path: PathBuf,
    records: Mutex<BTreeMap<String, PaperRecord>>,
}

impl DedupIndex {
    /// Load the index at `path`; a missing file is an empty index.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = load(&path).await?;

        tracing::debug!(path = %path.display(), entries = records.len(), "dedup index loaded");
        Ok(Self { path, records: Mutex::new(records) })
    }

    /// Index file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `pmid` has a stored `Done` record.
    pub async fn is_processed(&self, pmid: &str) -> bool {
        self.records.lock().await.contains_key(pmid)
    }

    /// Stored record for `pmid`.
    pub async fn get(&self, pmid: &str) -> Option<PaperRecord> {
        self.records.lock().await.get(pmid).cloned()
    }

    /// Record `record` as processed. Records that are not `Done` are ignored.
    pub async fn mark_processed(&self, record: &PaperRecord) -> Result<(), StoreError> {
        if !record.is_done() {
            return Ok(());
        }

        let mut records = self.records.lock().await;
        // pick up entries written by other processes since the last load
        match load(&self.path).await {
            Ok(on_disk) => {
                for (pmid, stored) in on_disk {
                    records.entry(pmid).or_insert(stored);
                }
            }
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not re-read index"),
        }
        records.insert(record.pmid.clone(), record.clone());
        let json = serde_json::to_vec_pretty(&*records)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::io(parent, e))?;
        }
        write_atomic(&self.path, &json).await
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// True when nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

async fn load(path: &Path) -> Result<BTreeMap<String, PaperRecord>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Corrupt { path: path.display().to_string(), source }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(StoreError::io(path, e)),
    }
}
