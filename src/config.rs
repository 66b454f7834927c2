use crate::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_WORDS};
use crate::database::QdrantConfig;
use crate::embeddings::EmbeddingProvider;
use crate::ollama::{OllamaClient, OllamaConfig};
use crate::openai::{OpenAiClient, OpenAiConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_TOP_K: usize = 5;

/// Which service produces embeddings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    OpenAi,
    Ollama,
}

impl FromStr for EmbeddingProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingProviderKind::OpenAi),
            "ollama" => Ok(EmbeddingProviderKind::Ollama),
            other => Err(anyhow::anyhow!(
                "Unknown EMBEDDING_PROVIDER '{}' (expected 'openai' or 'ollama')",
                other
            )),
        }
    }
}

/// Application configuration assembled from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub qdrant: Option<QdrantConfig>,
    pub ollama: OllamaConfig,
    pub openai: Option<OpenAiConfig>,
    pub embedding_provider: EmbeddingProviderKind,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
}

impl AppConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = OpenAiConfig::from_lookup(&lookup)?;

        let embedding_provider = match lookup("EMBEDDING_PROVIDER") {
            Some(raw) => raw.parse()?,
            None if openai.is_some() => EmbeddingProviderKind::OpenAi,
            None => EmbeddingProviderKind::Ollama,
        };
        if embedding_provider == EmbeddingProviderKind::OpenAi && openai.is_none() {
            return Err(anyhow::anyhow!(
                "EMBEDDING_PROVIDER is openai but neither OPENAI_API_KEY nor OPENAI_KEY is set"
            ));
        }

        let chunking = ChunkingConfig {
            chunk_size: parse_or(&lookup, "CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            overlap_words: parse_or(&lookup, "CHUNK_OVERLAP_WORDS", DEFAULT_OVERLAP_WORDS)?,
        };
        if chunking.chunk_size == 0 {
            return Err(anyhow::anyhow!("CHUNK_SIZE must be greater than zero"));
        }

        Ok(AppConfig {
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            qdrant: QdrantConfig::from_lookup(&lookup),
            ollama: OllamaConfig::from_lookup(&lookup)?,
            openai,
            embedding_provider,
            chunking,
            top_k: parse_or(&lookup, "RAG_TOP_K", DEFAULT_TOP_K)?,
        })
    }

    /// Build the configured embedding client
    pub fn embedding_provider(&self) -> Result<EmbeddingProvider> {
        match self.embedding_provider {
            EmbeddingProviderKind::OpenAi => {
                let config = self
                    .openai
                    .clone()
                    .context("OpenAI embeddings selected without an API key")?;
                Ok(EmbeddingProvider::OpenAi(OpenAiClient::new(config)?))
            }
            EmbeddingProviderKind::Ollama => Ok(EmbeddingProvider::Ollama(OllamaClient::new(
                self.ollama.clone(),
            )?)),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: '{}'", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Ollama);
        assert_eq!(config.chunking, ChunkingConfig::default());
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(config.qdrant.is_none());
        assert!(config.openai.is_none());
    }

    #[test]
    fn test_openai_key_selects_openai() {
        let config = AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-1")])).unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::OpenAi);
    }

    #[test]
    fn test_explicit_provider_wins() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-1"),
            ("EMBEDDING_PROVIDER", "Ollama"),
        ]))
        .unwrap();
        assert_eq!(config.embedding_provider, EmbeddingProviderKind::Ollama);
    }

    #[test]
    fn test_openai_without_key_is_an_error() {
        assert!(AppConfig::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "openai")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("EMBEDDING_PROVIDER", "bert")])).is_err());
    }

    #[test]
    fn test_numeric_overrides_and_errors() {
        let config = AppConfig::from_lookup(lookup(&[
            ("CHUNK_SIZE", "500"),
            ("CHUNK_OVERLAP_WORDS", "0"),
            ("RAG_TOP_K", "3"),
            ("DATA_DIR", "/var/lib/medico"),
        ]))
        .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap_words, 0);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/medico"));

        assert!(AppConfig::from_lookup(lookup(&[("CHUNK_SIZE", "big")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("CHUNK_SIZE", "0")])).is_err());
    }

    #[test]
    fn test_qdrant_enabled_by_url() {
        let config =
            AppConfig::from_lookup(lookup(&[("QDRANT_URL", "http://localhost:6334")])).unwrap();
        assert!(config.qdrant.is_some());
    }
}
