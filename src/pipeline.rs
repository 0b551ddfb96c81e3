//! Retrieval pipeline orchestrator.
//!
//! [`RagPipeline`] composes the chunker, an [`EmbeddingProvider`], the search
//! backend, and the on-disk [`IndexCache`] behind two operations:
//! [`load_data`](RagPipeline::load_data) builds (or restores) the index for a
//! dataset, and [`retrieve`](RagPipeline::retrieve) answers ranked
//! similarity queries against it.
//!
//! # Example
//!
//! ```rust,ignore
//! use carelens::{RagPipeline, RagConfig, RetrieveOptions};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(embedder))
//!     .build()?;
//!
//! pipeline.load_data(Path::new("summaries.csv"), Some(100001), false).await?;
//! let results = pipeline.retrieve("what medication was prescribed", &opts).await?;
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheManifest, IndexCache, IndexSnapshot};
use crate::chunking::{Chunker, SentenceChunker};
use crate::config::RagConfig;
use crate::document::{Chunk, DischargeRecord, SearchResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::{build_backend, SearchBackend};
use crate::source;

/// Per-call parameters for [`RagPipeline::retrieve`].
#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    /// Maximum number of results to return.
    pub k: usize,
    /// Restrict results to one admission id.
    pub hadm_id: Option<i64>,
    /// Drop results scoring below this threshold.
    pub min_score: f32,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self { k: 5, hadm_id: None, min_score: 0.0 }
    }
}

/// The built index for one loaded dataset.
struct IndexState {
    chunks: Vec<Chunk>,
    backend: Box<dyn SearchBackend>,
    records: HashMap<i64, DischargeRecord>,
}

/// The retrieval pipeline orchestrator.
///
/// Holds the one mutable slot (the built index state) behind an async
/// `RwLock`: `load_data` replaces it, `retrieve` only reads. Construct one
/// via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    chunker: Box<dyn Chunker>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    cache: Option<IndexCache>,
    state: RwLock<Option<IndexState>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Retrieval options seeded from the configured defaults.
    pub fn default_options(&self) -> RetrieveOptions {
        RetrieveOptions {
            k: self.config.top_k,
            hadm_id: None,
            min_score: self.config.min_score,
        }
    }

    /// Whether an index has been built and queries can be served.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Number of chunks in the built index, or `None` before `load_data`.
    pub async fn chunk_count(&self) -> Option<usize> {
        self.state.read().await.as_ref().map(|s| s.chunks.len())
    }

    /// Look up a loaded record by admission id, for display metadata.
    pub async fn record(&self, hadm_id: i64) -> Option<DischargeRecord> {
        self.state.read().await.as_ref().and_then(|s| s.records.get(&hadm_id).cloned())
    }

    /// The configuration signature current index builds are stamped with.
    fn manifest(&self) -> CacheManifest {
        CacheManifest {
            model_id: self.embedding_provider.model_id().to_string(),
            dimensions: self.embedding_provider.dimensions(),
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
        }
    }

    /// Load a dataset and build the index: read → filter → cache → chunk →
    /// embed → index → persist.
    ///
    /// When `hadm_id_filter` is set, only that admission's record is indexed
    /// (single-patient mode). When `force_rebuild` is set, the cache is
    /// bypassed and overwritten.
    ///
    /// # Errors
    ///
    /// - [`RagError::DataSource`] if the file cannot be read.
    /// - [`RagError::RecordNotFound`] if `hadm_id_filter` matches no row.
    /// - Embedding errors from the provider.
    ///
    /// Cache failures never surface: unreadable or mismatched snapshots are
    /// rebuilt, failed saves are logged and ignored.
    pub async fn load_data(
        &self,
        path: &Path,
        hadm_id_filter: Option<i64>,
        force_rebuild: bool,
    ) -> Result<()> {
        // 1. Read the tabular source, restricted to one admission if asked.
        let mut records = source::load_records(path)?;
        if let Some(hadm_id) = hadm_id_filter {
            records.retain(|r| r.hadm_id == hadm_id);
            if records.is_empty() {
                return Err(RagError::RecordNotFound { hadm_id });
            }
            info!(hadm_id, "single-patient mode");
        }
        let record_map: HashMap<i64, DischargeRecord> =
            records.iter().map(|r| (r.hadm_id, r.clone())).collect();

        let manifest = self.manifest();
        let key = IndexCache::key(path, hadm_id_filter);

        // 2. Restore from cache unless forced, rejecting stale signatures.
        if !force_rebuild {
            if let Some(cache) = &self.cache {
                if let Some(snapshot) = cache.load(&key).await {
                    if snapshot.manifest == manifest {
                        info!(key, chunks = snapshot.chunks.len(), "restored index from cache");
                        self.install(snapshot.chunks, record_map).await;
                        return Ok(());
                    }
                    warn!(key, "cache signature mismatch, rebuilding");
                }
            }
        }

        // 3. Chunk every included record.
        let mut chunks: Vec<Chunk> = Vec::new();
        for record in &records {
            chunks.extend(self.chunker.chunk(record));
        }
        debug!(records = records.len(), chunks = chunks.len(), "chunked source");

        // 4. Embed the chunks, at most `embed_batch_size` per provider call.
        for batch in chunks.chunks_mut(self.config.embed_batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            let embeddings =
                self.embedding_provider.embed_batch(&texts).await.inspect_err(|e| {
                    error!(error = %e, "embedding failed during index build");
                })?;
            for (chunk, embedding) in batch.iter_mut().zip(embeddings) {
                chunk.embedding = embedding;
            }
        }

        // 5. Persist the snapshot; a failed save only costs the next startup.
        if let Some(cache) = &self.cache {
            let snapshot = IndexSnapshot { manifest, chunks: chunks.clone() };
            if let Err(e) = cache.save(&key, &snapshot).await {
                warn!(key, error = %e, "failed to persist index snapshot");
            }
        }

        // 6. Install the built index.
        let chunk_count = chunks.len();
        self.install(chunks, record_map).await;
        info!(source = %path.display(), chunks = chunk_count, "index built");
        Ok(())
    }

    async fn install(&self, chunks: Vec<Chunk>, records: HashMap<i64, DischargeRecord>) {
        let vectors: Vec<Vec<f32>> = chunks.iter().map(|c| c.embedding.clone()).collect();
        let backend = build_backend(vectors);
        *self.state.write().await = Some(IndexState { chunks, backend, records });
    }

    /// Query the index: embed → search → threshold.
    ///
    /// Returns at most `options.k` results ordered by non-increasing score,
    /// every one scoring at least `options.min_score` and, when
    /// `options.hadm_id` is set, belonging to that admission. An empty result
    /// list is a valid outcome, not an error.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuery`] if the query is blank after trimming.
    /// - [`RagError::IndexNotReady`] before a successful `load_data`.
    /// - Embedding errors from the provider.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let state = self.state.read().await;
        let state = state.as_ref().ok_or(RagError::IndexNotReady)?;
        if state.chunks.is_empty() {
            debug!("retrieve against empty index");
            return Ok(Vec::new());
        }

        // The query must go through the same provider that built the index.
        let query_embedding = self.embedding_provider.embed(query).await.inspect_err(|e| {
            error!(error = %e, "embedding failed during query");
        })?;

        // Admission filtering pre-restricts which positions are searched.
        let allowed: Option<HashSet<usize>> = options.hadm_id.map(|hadm_id| {
            state
                .chunks
                .iter()
                .enumerate()
                .filter(|(_, chunk)| chunk.hadm_id == hadm_id)
                .map(|(position, _)| position)
                .collect()
        });

        let ranked = state.backend.search(&query_embedding, options.k, allowed.as_ref());
        let results: Vec<SearchResult> = ranked
            .into_iter()
            .filter(|(_, score)| *score >= options.min_score)
            .map(|(position, score)| SearchResult { chunk: state.chunks[position].clone(), score })
            .collect();

        debug!(
            backend = state.backend.name(),
            result_count = results.len(),
            k = options.k,
            "query completed"
        );
        Ok(results)
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config` defaults to [`RagConfig::default()`]; the embedding provider is
/// required. The chunker is derived from the config so the cache signature
/// always matches what actually produced the chunks.
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider is missing or
    /// the chunking parameters are inconsistent.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        let embedding_provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        let chunker = SentenceChunker::new(config.chunk_size, config.chunk_overlap)?;
        let cache = config.cache_dir.as_ref().map(IndexCache::new);

        Ok(RagPipeline {
            config,
            chunker: Box::new(chunker),
            embedding_provider,
            cache,
            state: RwLock::new(None),
        })
    }
}
