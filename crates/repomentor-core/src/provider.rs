//! Narrow interfaces to the embedding and generation collaborators.
//!
//! The core only ever talks to these traits; [crate::ollama::OllamaClient] is the
//! shipped implementation.

use std::future::Future;

/// Which side of retrieval a text is embedded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedMode {
    /// Chunks written to the index.
    Document,
    /// Questions asked against the index.
    Query,
}

impl EmbedMode {
    /// Task prefix understood by `nomic-embed-text` style models.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Document => "search_document: ",
            Self::Query => "search_query: ",
        }
    }
}

/// Turns text into vectors. Both modes must produce the same dimensionality.
pub trait Embedder: Send + Sync {
    /// Embed every input; returns one vector per input, in order.
    fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> impl Future<Output = Result<Vec<Vec<f32>>, LlmError>> + Send;
}

/// Turns a prompt into prose.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str) -> impl Future<Output = Result<String, LlmError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
    #[error("expected {expected} embeddings, got {actual}")]
    Mismatch { expected: usize, actual: usize },
    #[error("{0}")]
    Other(String),
}
