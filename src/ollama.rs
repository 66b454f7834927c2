use crate::embeddings::{embedding_input, Embedding};
use crate::generation::Generator;
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "AlthosKal/medicoia";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for a local Ollama server
#[derive(Debug, Clone, PartialEq)]
pub struct OllamaConfig {
    pub url: String,
    /// Model used to answer questions
    pub model: String,
    /// Model used for embeddings
    pub embedding_model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            url: DEFAULT_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

impl OllamaConfig {
    /// Build the configuration from a variable lookup, using defaults for unset values
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = OllamaConfig::default();

        let timeout = match lookup("OLLAMA_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid OLLAMA_TIMEOUT_SECS: {}", raw))?,
            ),
            None => defaults.timeout,
        };

        Ok(OllamaConfig {
            url: lookup("OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.url),
            model: lookup("OLLAMA_MODEL").unwrap_or(defaults.model),
            embedding_model: lookup("OLLAMA_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            timeout,
            ..defaults
        })
    }
}

/// Client for the Ollama HTTP API
#[derive(Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OllamaClient { config, client })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    /// Generate text for a prompt with the answering model
    pub async fn generate_text(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
        };

        let url = format!("{}/api/generate", self.config.url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Ollama model {} took too long to respond", self.config.model)
                } else if e.is_connect() {
                    anyhow::anyhow!(
                        "Cannot connect to Ollama at {}. Make sure it is running.",
                        self.config.url
                    )
                } else {
                    anyhow::Error::new(e).context("Ollama request failed")
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Ollama API error: {} {}",
                status,
                error_text
            ));
        }

        let response_data: GenerateResponse = response.json().await?;
        let text = response_data.response.trim().to_string();
        if text.is_empty() {
            return Err(anyhow::anyhow!("Empty response from Ollama"));
        }
        debug!("Ollama generated {} characters", text.len());

        Ok(text)
    }

    /// Generate embeddings for a text with the embedding model
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            prompt: embedding_input(text),
        };

        let url = format!("{}/api/embeddings", self.config.url);
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to reach Ollama at {}", self.config.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "Ollama API error: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbeddingResponse = response.json().await?;
        Embedding::from_values(response_data.embedding, &self.config.embedding_model)
    }
}

impl Generator for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.generate_text(prompt).await
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}
