use crate::embeddings::{embedding_input, Embedding};
use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration for the OpenAI embeddings API
#[derive(Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub embeddings_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("embeddings_url", &self.embeddings_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiConfig {
    /// Build the configuration from a variable lookup.
    /// Returns `Ok(None)` when neither `OPENAI_API_KEY` nor `OPENAI_KEY` is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(api_key) = lookup("OPENAI_API_KEY")
            .or_else(|| lookup("OPENAI_KEY"))
            .filter(|k| !k.trim().is_empty())
        else {
            return Ok(None);
        };
        let embeddings_url = lookup("OPENAI_EMBEDDINGS_URL")
            .unwrap_or_else(|| DEFAULT_EMBEDDINGS_URL.to_string());
        let model =
            lookup("EMBEDDING_MODEL").unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string());
        let timeout = match lookup("OPENAI_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid OPENAI_TIMEOUT_SECS: {}", raw))?,
            ),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Some(OpenAiConfig {
            api_key,
            embeddings_url,
            model,
            timeout,
        }))
    }
}

/// Client for the OpenAI embeddings endpoint
#[derive(Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(OpenAiClient { config, client })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Generate embeddings for a text
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            model: &'a str,
            input: &'a str,
        }

        let request = EmbeddingRequest {
            model: &self.config.model,
            input: embedding_input(text),
        };

        let response = self
            .client
            .post(&self.config.embeddings_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("OpenAI embeddings API took too long to respond")
                } else {
                    anyhow::Error::new(e).context("Failed to reach the OpenAI embeddings API")
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow::anyhow!(
                "API request failed: {} {}",
                status,
                error_text
            ));
        }

        let response_data: EmbeddingResponse = response.json().await?;
        let values = response_data
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?;
        debug!("Received {}-dimensional embedding", values.len());

        Embedding::from_values(values, &self.config.model)
    }
}

#[derive(Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct EmbeddingData {
    embedding: Vec<f32>,
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
    fn test_config_requires_key() {
        assert_eq!(OpenAiConfig::from_lookup(lookup(&[])).unwrap(), None);
    }

    #[test]
    fn test_config_accepts_legacy_key_name() {
        let config = OpenAiConfig::from_lookup(lookup(&[("OPENAI_KEY", "sk-test")]))
            .unwrap()
            .unwrap();
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.embeddings_url, DEFAULT_EMBEDDINGS_URL);
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn test_config_timeout() {
        let config = OpenAiConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_TIMEOUT_SECS", "5"),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(OpenAiClient::new(config).is_ok());

        assert!(OpenAiConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_TIMEOUT_SECS", "never"),
        ]))
        .is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let config = OpenAiConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-secret")]))
            .unwrap()
            .unwrap();
        assert!(!format!("{:?}", config).contains("sk-secret"));
    }

    #[test]
    fn test_parse_embedding_response() {
        let body = r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.5,-0.25]}],"model":"text-embedding-3-small"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.5, -0.25]);
    }
}
