//! On-disk artifacts keyed by paper identifier.
//!
//! PDFs and markdown live under separate roots as `pmid_<PMID>.pdf` and
//! `pmid_<PMID>.md`. Writes land in a temporary sibling first and are linked
//! into place; an existing artifact is never rewritten.

mod index;
mod locks;
mod shared;

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub use index::DedupIndex;
pub use locks::{KeyGuard, KeyedLocks};
pub use shared::SharedStorage;

use crate::config::Config;
use crate::error::StoreError;

/// Artifact flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Downloaded full text.
    Pdf,
    /// Markdown converted from the PDF.
    Markdown,
}

impl ArtifactKind {
    const fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Markdown => "md",
        }
    }
}

/// Result of a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Final artifact path.
    pub path: PathBuf,
    /// False when the artifact already existed and nothing was written.
    pub created: bool,
}

/// Idempotent artifact storage.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    pdf_dir: PathBuf,
    markdown_dir: PathBuf,
}

impl ArtifactStore {
    /// Store rooted at the given directories. Nothing is created until the
    /// first write.
    #[must_use]
    pub fn new(pdf_dir: impl Into<PathBuf>, markdown_dir: impl Into<PathBuf>) -> Self {
        Self { pdf_dir: pdf_dir.into(), markdown_dir: markdown_dir.into() }
    }

    /// Store at the configured locations.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.pdf_dir, &config.markdown_dir)
    }

    /// Where the artifact for `(pmid, kind)` lives, whether or not it exists.
    #[must_use]
    pub fn path_for(&self, pmid: &str, kind: ArtifactKind) -> PathBuf {
        let root = match kind {
            ArtifactKind::Pdf => &self.pdf_dir,
            ArtifactKind::Markdown => &self.markdown_dir,
        };
        root.join(format!("pmid_{}.{}", file_stem(pmid), kind.extension()))
    }

    /// Whether the artifact is present.
    pub async fn exists(&self, pmid: &str, kind: ArtifactKind) -> bool {
        tokio::fs::try_exists(self.path_for(pmid, kind)).await.unwrap_or(false)
    }

    /// Path of the artifact if present.
    pub async fn read_path(&self, pmid: &str, kind: ArtifactKind) -> Option<PathBuf> {
        let path = self.path_for(pmid, kind);
        tokio::fs::try_exists(&path).await.unwrap_or(false).then_some(path)
    }

    /// Artifact bytes, or `None` if absent.
    pub async fn read(&self, pmid: &str, kind: ArtifactKind) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(pmid, kind);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    /// Write `bytes` unless the artifact already exists.
    pub async fn write(
        &self,
        pmid: &str,
        kind: ArtifactKind,
        bytes: &[u8],
    ) -> Result<StoredArtifact, StoreError> {
        let path = self.path_for(pmid, kind);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(pmid, path = %path.display(), "artifact exists, skipping write");
            return Ok(StoredArtifact { path, created: false });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| StoreError::io(parent, e))?;
        }
        let created = write_new(&path, bytes).await?;

        if created {
            tracing::debug!(pmid, path = %path.display(), bytes = bytes.len(), "artifact written");
        } else {
            tracing::debug!(pmid, path = %path.display(), "artifact appeared concurrently, kept existing");
        }
        Ok(StoredArtifact { path, created })
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()))
}

async fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    let tmp = temp_sibling(path);
    if let Err(e) = tokio::fs::write(&tmp, bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(&tmp, e));
    }
    Ok(tmp)
}

/// Write to a unique temporary sibling, then rename over `path`.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = write_temp(path, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

/// Like [`write_atomic`] but never replaces an existing `path`.
///
/// Returns false when `path` was already there. Falls back to a rename on
/// filesystems without hard links.
async fn write_new(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    let tmp = write_temp(path, bytes).await?;
    let outcome = match tokio::fs::hard_link(&tmp, path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(_) => tokio::fs::rename(&tmp, path).await.map(|()| true).map_err(|e| StoreError::io(path, e)),
    };
    let _ = tokio::fs::remove_file(&tmp).await;
    outcome
}

/// Hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Identifiers become file names; anything outside `[A-Za-z0-9_-]` is replaced.
fn file_stem(pmid: &str) -> String {
    pmid.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') { c } else { '_' })
        .collect()
}
