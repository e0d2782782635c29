use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::candidate::CandidateProfile;

/// The embedding service rejects longer inputs.
const EMBED_INPUT_CAP: usize = 8_191;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Extraction service returned an empty result")]
    EmptyResponse,
    #[error("Extraction service returned malformed output: {0}")]
    MalformedResponse(String),
    #[error("Extraction service unreachable: {0}")]
    Transport(String),
    #[error("Internal extraction error: {0}")]
    Internal(String),
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Delegated text-understanding step: normalized resume text in, structured
/// candidate record out. Empty or invalid output is a failure, never an
/// empty success.
#[async_trait::async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> ExtractResult<CandidateProfile>;
}

/// Best-effort semantic embedding; `None` is non-fatal.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;
}

/// HTTP client for a structured-field extraction endpoint.
///
/// Posts `{"text": ...}` and expects the candidate record as a JSON object.
pub struct HttpFieldExtractor {
    endpoint: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpFieldExtractor {
    pub fn new(endpoint: Url) -> ExtractResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::Internal(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key: None,
            client,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait::async_trait]
impl FieldExtractor for HttpFieldExtractor {
    async fn extract(&self, text: &str) -> ExtractResult<CandidateProfile> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "text": text }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractError::Transport(e.to_string()))?
            .error_for_status()
            .map_err(|e| ExtractError::Transport(e.to_string()))?;

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExtractError::MalformedResponse(e.to_string()))?;

        let profile: CandidateProfile = serde_json::from_value(value)
            .map_err(|e| ExtractError::MalformedResponse(e.to_string()))?;

        if profile.is_empty() {
            return Err(ExtractError::EmptyResponse);
        }

        Ok(profile)
    }
}

/// HTTP client for an embedding endpoint; any failure collapses to `None`.
pub struct HttpEmbedder {
    endpoint: Url,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpEmbedder {
    pub fn new(endpoint: Url) -> ExtractResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExtractError::Internal(e.to_string()))?;

        Ok(Self {
            endpoint,
            api_key: None,
            client,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }

        let input: String = trimmed.chars().take(EMBED_INPUT_CAP).collect();

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "input": input }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await.and_then(|r| r.error_for_status()) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("embedding request failed: {e}");
                return None;
            }
        };

        let value: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("embedding response unreadable: {e}");
                return None;
            }
        };

        let vector = value
            .get("embedding")
            .or_else(|| value.get("data"))
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(serde_json::Value::as_f64)
                    .map(|f| f as f32)
                    .collect::<Vec<f32>>()
            })?;

        if vector.is_empty() {
            None
        } else {
            Some(vector)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_builds_from_url() {
        let url = Url::parse("http://localhost:9000/extract").unwrap();
        assert!(HttpFieldExtractor::new(url).is_ok());
    }

    #[test]
    fn test_embed_input_cap() {
        assert_eq!(EMBED_INPUT_CAP, 8_191);
    }
}
