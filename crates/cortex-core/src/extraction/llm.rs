//! External extractor interface
//!
//! The LLM that turns transcript windows into candidates is an external
//! collaborator. The pipeline consumes it through [`CandidateExtractor`];
//! the blocking HTTP implementation here talks to the provider's completion
//! endpoint with the same error taxonomy as the embedding client.

use serde::Deserialize;

use crate::embeddings::remote::{map_http_status, DEFAULT_BASE_URL};
use crate::error::{CortexError, Result};

/// Anything that can turn an extraction prompt into raw model output
pub trait CandidateExtractor {
    fn extract(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    completion: String,
}

/// Provider-backed extractor
pub struct RemoteExtractor {
    http: reqwest::blocking::Client,
    base_url: String,
    key: String,
}

impl RemoteExtractor {
    pub fn new(key: impl Into<String>) -> RemoteExtractor {
        Self::with_base_url(key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(key: impl Into<String>, base_url: impl Into<String>) -> RemoteExtractor {
        RemoteExtractor {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
        }
    }
}

impl CandidateExtractor for RemoteExtractor {
    fn extract(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/extract", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.key)
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .map_err(|e| CortexError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_status(status.as_u16(), &url));
        }

        let parsed: ExtractResponse = response
            .json()
            .map_err(|e| CortexError::MalformedResponse(format!("extract response: {e}")))?;
        Ok(parsed.completion)
    }
}
