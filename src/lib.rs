//! Retrieval-augmented Q&A over clinical discharge summaries.
//!
//! `carelens` turns a tabular export of discharge summaries into a
//! patient-scoped retrieval index: records are split into overlapping
//! sentence-aware chunks, embedded, indexed for cosine-similarity search,
//! and cached on disk so repeated runs skip re-embedding. A thin Q&A facade
//! hands the best-matching chunks to an external answer generator and
//! returns the answer together with its sources for citation display.
//!
//! # Architecture
//!
//! - [`chunking`] — sentence-aware fixed-size splitting.
//! - [`embedding`] — the [`EmbeddingProvider`] seam; implementations in
//!   [`local`] (`local` feature) and [`gemini`] (`gemini` feature).
//! - [`index`] — interchangeable exact search backends ([`index::FlatIndex`]
//!   with the `matrix` feature, [`index::ScanIndex`] always).
//! - [`cache`] — keyed on-disk snapshots keyed by source file and patient.
//! - [`pipeline`] — the [`RagPipeline`] orchestrator: `load_data` and
//!   `retrieve`.
//! - [`qa`] — the [`PatientQa`] facade over retrieval plus answer
//!   generation.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use carelens::{PatientQa, RagConfig, RagPipeline};
//!
//! let pipeline = Arc::new(
//!     RagPipeline::builder()
//!         .config(RagConfig::builder().cache_dir("models/cache").build()?)
//!         .embedding_provider(Arc::new(embedder))
//!         .build()?,
//! );
//! pipeline.load_data(path, Some(100001), false).await?;
//!
//! let qa = PatientQa::new(pipeline, Arc::new(generator));
//! let reply = qa.ask("What medication was I prescribed?", None).await?;
//! ```

pub mod cache;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod pipeline;
pub mod qa;
pub mod source;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "local")]
pub mod local;

pub use cache::{CacheManifest, IndexCache, IndexSnapshot};
pub use chunking::{Chunker, SentenceChunker};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{Chunk, DischargeRecord, SearchResult};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use generation::AnswerGenerator;
pub use index::{ScanIndex, SearchBackend};
pub use pipeline::{RagPipeline, RagPipelineBuilder, RetrieveOptions};
pub use qa::{PatientQa, QaAnswer, RecordSummary};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, GeminiGenerator};
#[cfg(feature = "local")]
pub use local::LocalEmbeddingProvider;
#[cfg(feature = "matrix")]
pub use index::FlatIndex;
