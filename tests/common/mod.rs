//! Shared fixtures: a deterministic stub embedder, stub generators, and CSV
//! helpers for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use carelens::{AnswerGenerator, EmbeddingProvider, RagError, Result};

/// Vocabulary axes of the stub embedding space.
///
/// Each keyword maps to one dimension; a text's vector marks which keywords
/// it contains. This makes similarity fully predictable: texts score by the
/// keywords they share with the query, and keyword-free text embeds to the
/// zero vector (similarity 0.0).
const KEYWORDS: [&str; 10] = [
    "medication",
    "amoxicillin",
    "pneumonia",
    "patient",
    "discharge",
    "follow",
    "daily",
    "weeks",
    "warfarin",
    "cardiology",
];

/// Deterministic embedding provider for tests.
///
/// Counts `embed_batch` calls so cache hits (which skip re-embedding) are
/// observable.
pub struct StubEmbedder {
    pub batch_calls: Arc<AtomicUsize>,
    model_id: String,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::with_counter(Arc::new(AtomicUsize::new(0)))
    }

    pub fn with_counter(batch_calls: Arc<AtomicUsize>) -> Self {
        Self { batch_calls, model_id: "stub-keywords-v1".to_string() }
    }

    pub fn with_model_id(mut self, model_id: &str) -> Self {
        self.model_id = model_id.to_string();
        self
    }

    fn encode(text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        KEYWORDS
            .iter()
            .map(|keyword| if lowered.contains(keyword) { 1.0 } else { 0.0 })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::encode(text))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::encode(t)).collect())
    }

    fn dimensions(&self) -> usize {
        KEYWORDS.len()
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Generator that wraps the question into a fixed answer.
pub struct EchoGenerator;

#[async_trait]
impl AnswerGenerator for EchoGenerator {
    async fn generate_answer(&self, question: &str, context: &str) -> Result<String> {
        Ok(format!("Answer to '{question}' from {} bytes of context", context.len()))
    }
}

/// Generator that always fails, simulating an unreachable service.
pub struct FailingGenerator;

#[async_trait]
impl AnswerGenerator for FailingGenerator {
    async fn generate_answer(&self, _question: &str, _context: &str) -> Result<String> {
        Err(RagError::GenerationUnavailable {
            message: "service unreachable".to_string(),
            sources: Vec::new(),
        })
    }
}

/// Write a summaries CSV with the given `(hadm_id, text)` rows.
pub fn write_summaries(dir: &Path, rows: &[(i64, &str)]) -> PathBuf {
    let path = dir.join("summaries.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "hadm_id,text").unwrap();
    for (hadm_id, text) in rows {
        writeln!(file, "{hadm_id},\"{text}\"").unwrap();
    }
    file.flush().unwrap();
    path
}

/// The discharge note used by retrieval scenarios.
pub const PNEUMONIA_NOTE: &str = "Patient has pneumonia. Discharge medication: \
     amoxicillin 500mg twice daily. Follow-up in 2 weeks with Dr. Lee.";
