//! On-disk cache of built index snapshots.
//!
//! Each (source file, admission filter) pair maps to one bincode blob under
//! the cache directory, so one patient's embeddings are cached independently
//! of another's. A blob stores the chunks with their embeddings plus the
//! manifest describing the configuration that produced them; the pipeline
//! validates the manifest before reuse.
//!
//! Caching is a latency optimization, never a correctness dependency: a
//! missing, unreadable, or undecodable blob is a cache miss that triggers a
//! rebuild.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// The configuration signature a snapshot was built under.
///
/// A snapshot is valid only for the exact signature that produced it; any
/// mismatch must trigger a rebuild, not silent reuse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheManifest {
    /// Identifier of the embedding model.
    pub model_id: String,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Chunk size the chunks were produced with.
    pub chunk_size: usize,
    /// Chunk overlap the chunks were produced with.
    pub chunk_overlap: usize,
}

/// A persisted snapshot of a built index: manifest plus embedded chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// The configuration signature the snapshot was built under.
    pub manifest: CacheManifest,
    /// The chunks, each carrying its embedding vector.
    pub chunks: Vec<Chunk>,
}

/// Keyed blob storage for [`IndexSnapshot`]s under one directory.
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    /// Create a cache rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Derive the cache key for a source file and optional admission filter.
    ///
    /// The key combines the file stem with the admission id (or `all`), so
    /// per-patient blobs never collide with each other or with the
    /// whole-dataset blob.
    pub fn key(source: &Path, hadm_id: Option<i64>) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string());
        let stem: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        match hadm_id {
            Some(id) => format!("{stem}_{id}"),
            None => format!("{stem}_all"),
        }
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.idx"))
    }

    /// Load a snapshot by key. Any failure is a miss, never an error.
    pub async fn load(&self, key: &str) -> Option<IndexSnapshot> {
        let path = self.blob_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "cache blob unreadable, treating as miss");
                return None;
            }
        };

        match bincode::deserialize::<IndexSnapshot>(&bytes) {
            Ok(snapshot) => {
                debug!(key, chunks = snapshot.chunks.len(), "cache hit");
                Some(snapshot)
            }
            Err(e) => {
                warn!(key, error = %e, "cache blob corrupt, treating as miss");
                None
            }
        }
    }

    /// Persist a snapshot under `key`, overwriting any previous blob.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Cache`] if serialization or the write fails. The
    /// pipeline downgrades this to a warning; retrieval works without it.
    pub async fn save(&self, key: &str, snapshot: &IndexSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RagError::Cache(format!("failed to create cache dir: {e}")))?;

        let bytes = bincode::serialize(snapshot)
            .map_err(|e| RagError::Cache(format!("failed to encode snapshot: {e}")))?;

        let path = self.blob_path(key);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| RagError::Cache(format!("failed to write '{}': {e}", path.display())))?;

        debug!(key, chunks = snapshot.chunks.len(), "cache saved");
        Ok(())
    }
}
