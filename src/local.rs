//! Local sentence-embedding provider backed by `fastembed`.
//!
//! This module is only available when the `local` feature is enabled.
//!
//! Models are resolved by name and loaded once per process: repeated
//! construction of providers for the same model reuses the already-loaded
//! weights instead of reloading them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tracing::{debug, info};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default sentence-embedding model.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Process-wide cache of loaded models, keyed by canonical model name.
static MODEL_CACHE: OnceLock<Mutex<HashMap<String, Arc<TextEmbedding>>>> = OnceLock::new();

/// Resolve a model name to the fastembed model and its dimensionality.
///
/// The name must match exactly (modulo the optional hub prefix); silently
/// substituting a different model would invalidate any cache built under the
/// original model's vector space.
fn resolve(name: &str) -> Option<(EmbeddingModel, usize)> {
    match name.trim_start_matches("sentence-transformers/").trim_start_matches("BAAI/") {
        "all-MiniLM-L6-v2" => Some((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-MiniLM-L12-v2" => Some((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Some((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Some((EmbeddingModel::BGEBaseENV15, 768)),
        _ => None,
    }
}

/// An [`EmbeddingProvider`] running a pretrained sentence-embedding model
/// in-process.
pub struct LocalEmbeddingProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbeddingProvider {
    /// Load (or reuse) the named model.
    ///
    /// The first load per process downloads and initializes the model and
    /// blocks until done; subsequent calls for the same name are cheap.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ModelUnavailable`] if the name does not resolve
    /// to a known model or the weights cannot be loaded.
    pub fn new(model_name: &str) -> Result<Self> {
        let (model_kind, dimensions) =
            resolve(model_name).ok_or_else(|| RagError::ModelUnavailable {
                model: model_name.to_string(),
                message: "unknown model name".to_string(),
            })?;

        let cache = MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
        let mut cache = cache.lock().expect("model cache poisoned");

        let model = match cache.get(model_name) {
            Some(model) => {
                debug!(model = model_name, "reusing loaded embedding model");
                Arc::clone(model)
            }
            None => {
                info!(model = model_name, "loading embedding model");
                let loaded = TextEmbedding::try_new(
                    InitOptions::new(model_kind).with_show_download_progress(false),
                )
                .map_err(|e| RagError::ModelUnavailable {
                    model: model_name.to_string(),
                    message: format!("{e}"),
                })?;
                let model = Arc::new(loaded);
                cache.insert(model_name.to_string(), Arc::clone(&model));
                model
            }
        };

        Ok(Self { model, model_name: model_name.to_string(), dimensions })
    }

    /// Load the default model (`all-MiniLM-L6-v2`).
    pub fn default_model() -> Result<Self> {
        Self::new(DEFAULT_MODEL)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: "fastembed".into(),
            message: "model returned no embedding".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model_name, batch_size = texts.len(), "embedding batch");

        // Encoding is CPU-bound; keep it off the async runtime.
        let model = Arc::clone(&self.model);
        let owned: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
        tokio::task::spawn_blocking(move || {
            model.embed(owned, None).map_err(|e| RagError::Embedding {
                provider: "fastembed".into(),
                message: format!("{e}"),
            })
        })
        .await
        .map_err(|e| RagError::Embedding {
            provider: "fastembed".into(),
            message: format!("embedding task failed: {e}"),
        })?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model_name
    }
}
