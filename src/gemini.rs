//! Gemini providers over the REST API.
//!
//! This module is only available when the `gemini` feature is enabled. It
//! provides [`GeminiGenerator`] (answer synthesis via `generateContent`) and
//! [`GeminiEmbeddingProvider`] (`batchEmbedContents`).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::AnswerGenerator;

/// Base URL of the Generative Language API.
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default generation model.
const DEFAULT_GENERATION_MODEL: &str = "gemini-2.0-flash";

/// The default embedding model and its dimensionality.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_EMBEDDING_DIMENSIONS: usize = 768;

/// Sampling temperature for grounded patient answers.
const ANSWER_TEMPERATURE: f32 = 0.3;
const ANSWER_MAX_OUTPUT_TOKENS: u32 = 2048;

fn api_key_from_env() -> Option<String> {
    std::env::var("GEMINI_API_KEY").or_else(|_| std::env::var("GOOGLE_API_KEY")).ok()
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: String,
    content: Content<'a>,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail =
        serde_json::from_str::<ApiErrorResponse>(&body).map(|e| e.error.message).unwrap_or(body);
    format!("API returned {status}: {detail}")
}

// ── Answer generator ───────────────────────────────────────────────

/// An [`AnswerGenerator`] backed by the Gemini `generateContent` endpoint.
///
/// Uses a low temperature and a grounding prompt that restricts the answer
/// to the provided discharge-summary context.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    /// Create a new generator with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("Gemini API key must not be empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_GENERATION_MODEL.to_string(),
        })
    }

    /// Create a generator from `GEMINI_API_KEY` or `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| {
            RagError::Config("GEMINI_API_KEY or GOOGLE_API_KEY environment variable not set".into())
        })?;
        Self::new(api_key)
    }

    /// Set the generation model name (e.g. `gemini-2.5-flash`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn prompt(question: &str, context: &str) -> String {
        format!(
            "You are helping a patient understand their discharge summary. Answer the \
             question using ONLY the excerpts below, in simple patient-friendly language. \
             If the excerpts do not contain the answer, say so clearly.\n\n\
             DISCHARGE SUMMARY EXCERPTS:\n{context}\n\
             PATIENT'S QUESTION: {question}\n\n\
             ANSWER (based only on the excerpts above):"
        )
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate_answer(&self, question: &str, context: &str) -> Result<String> {
        debug!(model = %self.model, context_len = context.len(), "generating answer");

        let prompt = Self::prompt(question, context);
        let request = GenerateRequest {
            contents: vec![Content { parts: vec![Part { text: &prompt }] }],
            generation_config: GenerationConfig {
                temperature: ANSWER_TEMPERATURE,
                max_output_tokens: ANSWER_MAX_OUTPUT_TOKENS,
            },
        };

        let url = format!("{BASE_URL}/models/{}:generateContent", self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "generation request failed");
                RagError::GenerationUnavailable {
                    message: format!("request failed: {e}"),
                    sources: Vec::new(),
                }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(%message, "generation API error");
            return Err(RagError::GenerationUnavailable { message, sources: Vec::new() });
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            RagError::GenerationUnavailable {
                message: format!("failed to parse response: {e}"),
                sources: Vec::new(),
            }
        })?;

        let answer = body
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect::<String>())
            .unwrap_or_default();

        if answer.trim().is_empty() {
            return Err(RagError::GenerationUnavailable {
                message: "empty response from model".to_string(),
                sources: Vec::new(),
            });
        }
        Ok(answer.trim().to_string())
    }
}

// ── Embedding provider ─────────────────────────────────────────────

/// An [`EmbeddingProvider`] backed by the Gemini embeddings API.
pub struct GeminiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbeddingProvider {
    /// Create a new provider with the given API key and the default
    /// `text-embedding-004` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Embedding {
                provider: "Gemini".into(),
                message: "API key must not be empty".into(),
            });
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        })
    }

    /// Create a provider from `GEMINI_API_KEY` or `GOOGLE_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = api_key_from_env().ok_or_else(|| RagError::Embedding {
            provider: "Gemini".into(),
            message: "GEMINI_API_KEY or GOOGLE_API_KEY environment variable not set".into(),
        })?;
        Self::new(api_key)
    }

    /// Set the embedding model name and its dimensionality.
    pub fn with_model(mut self, model: impl Into<String>, dimensions: usize) -> Self {
        self.model = model.into();
        self.dimensions = dimensions;
        self
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text]).await?;
        results.into_iter().next().ok_or_else(|| RagError::Embedding {
            provider: "Gemini".into(),
            message: "API returned empty response".into(),
        })
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "Gemini", batch_size = texts.len(), model = %self.model, "embedding batch");

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content { parts: vec![Part { text }] },
                })
                .collect(),
        };

        let url = format!("{BASE_URL}/models/{}:batchEmbedContents", self.model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(provider = "Gemini", error = %e, "embedding request failed");
                RagError::Embedding {
                    provider: "Gemini".into(),
                    message: format!("request failed: {e}"),
                }
            })?;

        if !response.status().is_success() {
            let message = error_detail(response).await;
            error!(provider = "Gemini", %message, "embedding API error");
            return Err(RagError::Embedding { provider: "Gemini".into(), message });
        }

        let body: BatchEmbedResponse = response.json().await.map_err(|e| RagError::Embedding {
            provider: "Gemini".into(),
            message: format!("failed to parse response: {e}"),
        })?;

        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
