//! Data types for discharge records, chunks, and search results.

use serde::{Deserialize, Serialize};

/// One patient admission's discharge summary plus display metadata.
///
/// Read once from the tabular source at load time and immutable thereafter.
/// The structured fields are for display only; retrieval operates on `text`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DischargeRecord {
    /// Hospital admission id, the unit of patient scoping.
    pub hadm_id: i64,
    /// Patient identifier, if present in the source.
    #[serde(default)]
    pub subject_id: Option<i64>,
    /// The free-text discharge summary.
    pub text: String,
    /// Age at admission, if present.
    #[serde(default)]
    pub age_at_admission: Option<f64>,
    /// Patient gender, if present.
    #[serde(default)]
    pub gender: Option<String>,
    /// Discharge diagnosis, if present.
    #[serde(default)]
    pub discharge_diagnosis: Option<String>,
    /// Discharge medications, if present.
    #[serde(default)]
    pub discharge_medications: Option<String>,
    /// Follow-up instructions, if present.
    #[serde(default)]
    pub follow_up: Option<String>,
}

/// A contiguous span of a [`DischargeRecord`]'s text with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{hadm_id}_{chunk_index}`.
    pub id: String,
    /// The admission id of the source record.
    pub hadm_id: i64,
    /// Position of this chunk within its source record.
    pub chunk_index: usize,
    /// Byte offset of the span start in the source text.
    pub start: usize,
    /// Byte offset of the span end (exclusive) in the source text.
    pub end: usize,
    /// The text of the span.
    pub text: String,
    /// The embedding vector, attached at index-build time.
    pub embedding: Vec<f32>,
}

/// A retrieved [`Chunk`] paired with a similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more relevant).
    pub score: f32,
}
