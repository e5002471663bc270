//! Ollama client for embeddings and completion. Wraps ollama-rs with a simple API.

use ollama_rs::generation::chat::request::ChatMessageRequest;
use ollama_rs::generation::chat::ChatMessage;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::Ollama;

use crate::config::Config;
use crate::provider::{EmbedMode, Embedder, Generator, LlmError};

pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_CHAT_MODEL: &str = "llama3.2";
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Thin wrapper around Ollama for embedding and answer generation.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    chat_model: String,
    task_prefixes: bool,
}

impl OllamaClient {
    /// Create from URL string. Default: http://localhost:11434.
    pub fn from_url(url: &str) -> Result<Self, LlmError> {
        let inner = Ollama::try_new(url)?;
        Ok(Self {
            inner,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            task_prefixes: true,
        })
    }

    /// Build a client from the persisted config.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        Ok(Self::from_url(&config.ollama_url)?
            .with_embed_model(config.embed_model.clone())
            .with_chat_model(config.chat_model.clone())
            .with_task_prefixes(config.task_prefixes))
    }

    /// Set the embedding model (e.g. `nomic-embed-text`, `all-minilm`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    /// Set the model that writes answers and explanations.
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Toggle `search_document:` / `search_query:` prefixes on embedded text.
    pub fn with_task_prefixes(mut self, enabled: bool) -> Self {
        self.task_prefixes = enabled;
        self
    }

    pub fn chat_model(&self) -> &str {
        &self.chat_model
    }

    fn prepare(&self, texts: &[String], mode: EmbedMode) -> Vec<String> {
        if !self.task_prefixes {
            return texts.to_vec();
        }
        texts
            .iter()
            .map(|t| format!("{}{}", mode.prefix(), t))
            .collect()
    }
}

impl Embedder for OllamaClient {
    /// Embed multiple strings in one call. Returns one embedding per input.
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbedMode,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let req = GenerateEmbeddingsRequest::new(
            self.embed_model.clone(),
            EmbeddingsInput::Multiple(self.prepare(texts, mode)),
        );
        let res = self.inner.generate_embeddings(req).await?;
        if res.embeddings.len() != texts.len() {
            return Err(LlmError::Mismatch {
                expected: texts.len(),
                actual: res.embeddings.len(),
            });
        }
        Ok(res.embeddings)
    }
}

impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let req = ChatMessageRequest::new(
            self.chat_model.clone(),
            vec![ChatMessage::user(prompt.to_string())],
        );
        let res = self.inner.send_chat_messages(req).await?;
        Ok(res.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_url() {
        assert!(matches!(
            OllamaClient::from_url("not a url"),
            Err(LlmError::ParseUrl(_))
        ));
    }

    #[test]
    fn prefixes_follow_mode() {
        let client = OllamaClient::from_url(DEFAULT_BASE_URL).unwrap();
        let texts = vec!["def foo(): pass".to_string()];
        assert_eq!(
            client.prepare(&texts, EmbedMode::Query),
            vec!["search_query: def foo(): pass".to_string()]
        );
        let bare = client.with_task_prefixes(false);
        assert_eq!(bare.prepare(&texts, EmbedMode::Document), texts);
    }

    #[test]
    fn from_config_applies_models() {
        let config = Config {
            chat_model: "qwen2.5-coder".into(),
            ..Config::default()
        };
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.chat_model(), "qwen2.5-coder");
    }

    #[tokio::test]
    async fn embed_with_unreachable_endpoint_errors() {
        let client = OllamaClient::from_url("http://127.0.0.1:1").unwrap();
        let result = client
            .embed_batch(&["text".to_string()], EmbedMode::Document)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn generate_with_unreachable_endpoint_errors() {
        let client = OllamaClient::from_url("http://127.0.0.1:1").unwrap();
        assert!(client.generate("hello").await.is_err());
    }

    #[tokio::test]
    async fn empty_batch_skips_request() {
        let client = OllamaClient::from_url("http://127.0.0.1:1").unwrap();
        let out = client.embed_batch(&[], EmbedMode::Document).await.unwrap();
        assert!(out.is_empty());
    }
}
