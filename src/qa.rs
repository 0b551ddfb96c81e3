//! Patient Q&A facade.
//!
//! [`PatientQa`] wraps the retrieval pipeline with patient-scoping
//! conveniences and delegates answer synthesis to an [`AnswerGenerator`].
//! Retrieved chunks are always returned alongside the answer for citation
//! display, including when generation fails.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;
use crate::pipeline::{RagPipeline, RetrieveOptions};

/// Answer returned when no chunk clears the similarity threshold.
const NO_CONTEXT_ANSWER: &str = "I could not find relevant information in the discharge \
     summary to answer this question. Please rephrase the question or contact your \
     healthcare provider.";

/// An answer with its supporting sources.
#[derive(Debug, Clone, Serialize)]
pub struct QaAnswer {
    /// The synthesized answer text.
    pub answer: String,
    /// The retrieved chunks the answer is grounded in, ranked by score.
    pub sources: Vec<SearchResult>,
    /// The admission the question was scoped to, if any.
    pub hadm_id: Option<i64>,
}

/// Display summary of one patient's discharge record.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    /// Hospital admission id.
    pub hadm_id: i64,
    /// Patient identifier, if present in the source.
    pub subject_id: Option<i64>,
    /// Age at admission.
    pub age: Option<f64>,
    /// Patient gender.
    pub gender: Option<String>,
    /// Discharge diagnosis.
    pub diagnosis: Option<String>,
    /// Discharge medications.
    pub medications: Option<String>,
    /// Follow-up instructions.
    pub follow_up: Option<String>,
    /// Length of the free-text summary in bytes.
    pub text_length: usize,
}

/// Q&A facade over a [`RagPipeline`] and an [`AnswerGenerator`].
pub struct PatientQa {
    pipeline: Arc<RagPipeline>,
    generator: Arc<dyn AnswerGenerator>,
    top_k: usize,
    min_score: f32,
}

impl PatientQa {
    /// Number of chunks retrieved as grounding context by default.
    pub const DEFAULT_TOP_K: usize = 5;
    /// Minimum similarity for a chunk to count as relevant context.
    pub const DEFAULT_MIN_SCORE: f32 = 0.3;

    /// Create a facade over a built (or to-be-built) pipeline.
    pub fn new(pipeline: Arc<RagPipeline>, generator: Arc<dyn AnswerGenerator>) -> Self {
        Self {
            pipeline,
            generator,
            top_k: Self::DEFAULT_TOP_K,
            min_score: Self::DEFAULT_MIN_SCORE,
        }
    }

    /// Set how many chunks are retrieved as context.
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set the relevance threshold for context chunks.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Answer a patient's question about their discharge summary.
    ///
    /// Retrieves the best-matching chunks (scoped to `hadm_id` when given),
    /// assembles them into a numbered context, and asks the generator. When
    /// nothing relevant is found, returns a no-information answer with empty
    /// sources rather than an error.
    ///
    /// # Errors
    ///
    /// Retrieval errors propagate unchanged. A generator failure becomes
    /// [`RagError::GenerationUnavailable`] carrying the retrieved sources, so
    /// callers can still show citations.
    pub async fn ask(&self, question: &str, hadm_id: Option<i64>) -> Result<QaAnswer> {
        let options = RetrieveOptions {
            k: self.top_k,
            hadm_id,
            min_score: self.min_score,
        };
        let sources = self.pipeline.retrieve(question, &options).await?;

        if sources.is_empty() {
            info!(hadm_id, "no relevant chunks for question");
            return Ok(QaAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
                hadm_id,
            });
        }

        let context = build_context(&sources);
        match self.generator.generate_answer(question, &context).await {
            Ok(answer) => {
                info!(hadm_id, source_count = sources.len(), "answer generated");
                Ok(QaAnswer { answer, sources, hadm_id })
            }
            Err(e) => {
                warn!(hadm_id, error = %e, "answer generation failed, returning sources only");
                let message = match e {
                    RagError::GenerationUnavailable { message, .. } => message,
                    other => other.to_string(),
                };
                Err(RagError::GenerationUnavailable { message, sources })
            }
        }
    }

    /// Display summary of a loaded patient record.
    pub async fn record_summary(&self, hadm_id: i64) -> Option<RecordSummary> {
        let record = self.pipeline.record(hadm_id).await?;
        Some(RecordSummary {
            hadm_id: record.hadm_id,
            subject_id: record.subject_id,
            age: record.age_at_admission,
            gender: record.gender,
            diagnosis: record.discharge_diagnosis,
            medications: record.discharge_medications,
            follow_up: record.follow_up,
            text_length: record.text.len(),
        })
    }
}

/// Concatenate retrieved chunks into a numbered grounding context.
fn build_context(sources: &[SearchResult]) -> String {
    let mut context = String::new();
    for (i, result) in sources.iter().enumerate() {
        context.push_str(&format!("[Section {}]\n{}\n\n", i + 1, result.chunk.text));
    }
    context
}
