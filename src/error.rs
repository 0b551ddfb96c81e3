//! Error types for the `carelens` crate.

use thiserror::Error;

use crate::document::SearchResult;

/// Errors that can occur in retrieval and Q&A operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error (invalid chunk size/overlap, bad builder input).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The named embedding model could not be resolved or loaded.
    ///
    /// Callers must not substitute a different model: any existing cache was
    /// built in the original model's vector space.
    #[error("Embedding model '{model}' unavailable: {message}")]
    ModelUnavailable {
        /// The model name that failed to resolve.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// No record with the requested admission id exists in the loaded source.
    #[error("No record found for admission id {hadm_id}")]
    RecordNotFound {
        /// The admission id that was requested.
        hadm_id: i64,
    },

    /// `retrieve` was called before `load_data` built an index.
    #[error("Index not ready: call load_data before retrieve")]
    IndexNotReady,

    /// The query was empty after trimming whitespace.
    #[error("Query is empty")]
    EmptyQuery,

    /// The tabular source could not be read or parsed.
    #[error("Data source error: {0}")]
    DataSource(String),

    /// An internal cache read/write failure.
    ///
    /// Never crosses the pipeline boundary: cache failures degrade to a
    /// rebuild, this variant exists for the cache layer's own signatures.
    #[error("Cache error: {0}")]
    Cache(String),

    /// The external answer generator failed.
    ///
    /// Carries the retrieved sources so callers can degrade gracefully to
    /// showing citations without a synthesized answer.
    #[error("Answer generation unavailable: {message}")]
    GenerationUnavailable {
        /// A description of the failure.
        message: String,
        /// The chunks that were retrieved before generation failed.
        sources: Vec<SearchResult>,
    },
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
