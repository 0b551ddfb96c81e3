//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (a local sentence model,
/// the Gemini API) behind a unified async interface. The default
/// [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support
/// native batching should override it.
///
/// All vectors in one index must come from the same provider: mixing models
/// invalidates the index, which is why [`model_id`](EmbeddingProvider::model_id)
/// is part of the cache signature.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// An empty input yields an empty output. The default implementation
    /// calls [`embed`](EmbeddingProvider::embed) sequentially for each input;
    /// override it if the backend supports native batching.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Return a stable identifier for the underlying model.
    ///
    /// Used to validate cached index snapshots against the active provider.
    fn model_id(&self) -> &str;
}
