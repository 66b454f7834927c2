//! Deterministic stand-ins for the embedding and generation services.

use crate::embeddings::{Embedder, Embedding};
use crate::generation::Generator;
use anyhow::Result;
use std::sync::Mutex;

/// Embeds text as keyword counts over a fixed vocabulary
pub(crate) struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
}

impl KeywordEmbedder {
    pub(crate) fn medical() -> Self {
        KeywordEmbedder {
            vocabulary: vec![
                "migraine", "headache", "light", "nausea", "pneumonia", "cough", "fever",
                "lungs", "diabetes", "glucose", "thirst", "urination",
            ],
        }
    }
}

impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Embedding> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        let values = self
            .vocabulary
            .iter()
            .map(|term| words.iter().filter(|w| w.as_str() == *term).count() as f32)
            .collect();

        Embedding::from_values(values, self.model_name())
    }

    fn model_name(&self) -> &str {
        "keyword-counts"
    }
}

pub(crate) struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Embedding> {
        Err(anyhow::anyhow!("embedding service unavailable"))
    }

    fn model_name(&self) -> &str {
        "failing"
    }
}

/// Returns a fixed reply and remembers every prompt it was given
pub(crate) struct CannedGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedGenerator {
    pub(crate) fn new(reply: &str) -> Self {
        CannedGenerator {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Generator for CannedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

pub(crate) struct FailingGenerator;

impl Generator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(anyhow::anyhow!("Cannot connect to Ollama"))
    }
}
