use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Longer inputs are cut before being sent to an embedding model
pub const MAX_EMBEDDING_INPUT_CHARS: usize = 8000;

/// Representation of a vector embedding
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    /// Reject empty vectors returned by a provider
    pub fn from_values(values: Vec<f32>, model: &str) -> Result<Self> {
        if values.is_empty() {
            return Err(anyhow::anyhow!(
                "Embedding model {} returned an empty vector",
                model
            ));
        }
        Ok(Embedding { values })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }
}

/// Anything that turns text into an embedding vector
#[allow(async_fn_in_trait)]
pub trait Embedder {
    /// Generate the embedding for a text
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Name of the model producing the vectors
    fn model_name(&self) -> &str;
}

/// Embedding backends selectable at runtime
pub enum EmbeddingProvider {
    OpenAi(OpenAiClient),
    Ollama(OllamaClient),
}

impl Embedder for EmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        match self {
            EmbeddingProvider::OpenAi(client) => client.embed(text).await,
            EmbeddingProvider::Ollama(client) => client.embed(text).await,
        }
    }

    fn model_name(&self) -> &str {
        match self {
            EmbeddingProvider::OpenAi(client) => client.config().model.as_str(),
            EmbeddingProvider::Ollama(client) => client.config().embedding_model.as_str(),
        }
    }
}

/// The prefix of `text` that is actually embedded
pub fn embedding_input(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBEDDING_INPUT_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
