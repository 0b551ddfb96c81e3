//! Answer generation seam for the Q&A facade.

use async_trait::async_trait;

use crate::error::Result;

/// An external collaborator that synthesizes an answer from retrieved context.
///
/// The facade passes the patient's question and the concatenated retrieved
/// chunks; the generator owns any prompting, retries, or streaming. A failing
/// generator never invalidates retrieval — the facade surfaces the sources
/// regardless.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer to `question` grounded in `context`.
    async fn generate_answer(&self, question: &str, context: &str) -> Result<String>;
}
