//! Remote embedding client
//!
//! Blocking HTTP client for the provider's embedding endpoints. The
//! capability probe is "key present and non-empty" and performs no network
//! call. Single-element requests use the per-item endpoint, larger batches
//! the batch endpoint; batches are capped at 100 inputs.

use serde::Deserialize;

use crate::error::{CortexError, Result};

use super::REMOTE_DIMENSIONS;

/// Default provider endpoint root
pub const DEFAULT_BASE_URL: &str = "https://api.cortex-mem.dev/v1";

/// Hard ceiling on a single batch request
pub const MAX_BATCH: usize = 100;

/// True when a usable provider key is configured. No network involved.
pub fn remote_available(key: Option<&str>) -> bool {
    key.is_some_and(|k| !k.trim().is_empty())
}

#[derive(Debug, Deserialize)]
struct SingleResponse {
    embedding: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    embeddings: Vec<Vec<f64>>,
}

/// Client over the provider's embedding surface
pub struct RemoteEmbeddingClient {
    http: reqwest::blocking::Client,
    base_url: String,
    key: String,
}

impl RemoteEmbeddingClient {
    pub fn new(key: impl Into<String>) -> RemoteEmbeddingClient {
        Self::with_base_url(key, DEFAULT_BASE_URL)
    }

    /// Point the client at a different endpoint root (tests, self-hosting).
    pub fn with_base_url(key: impl Into<String>, base_url: impl Into<String>) -> RemoteEmbeddingClient {
        RemoteEmbeddingClient {
            http: reqwest::blocking::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
        }
    }

    /// Embed a batch of texts, one 768-dim float64 vector per input, order
    /// preserved.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > MAX_BATCH {
            return Err(CortexError::InvalidInput(format!(
                "batch of {} exceeds the {MAX_BATCH}-input ceiling",
                texts.len()
            )));
        }

        if texts.len() == 1 {
            let body = serde_json::json!({ "text": texts[0] });
            let raw = self.post("/embed", &body)?;
            let parsed: SingleResponse = serde_json::from_str(&raw)
                .map_err(|e| CortexError::MalformedResponse(format!("embed response: {e}")))?;
            validate_dimensions(std::slice::from_ref(&parsed.embedding))?;
            Ok(vec![parsed.embedding])
        } else {
            let body = serde_json::json!({ "texts": texts });
            let raw = self.post("/embed/batch", &body)?;
            let parsed: BatchResponse = serde_json::from_str(&raw)
                .map_err(|e| CortexError::MalformedResponse(format!("batch response: {e}")))?;
            if parsed.embeddings.len() != texts.len() {
                return Err(CortexError::MalformedResponse(format!(
                    "asked for {} embeddings, got {}",
                    texts.len(),
                    parsed.embeddings.len()
                )));
            }
            validate_dimensions(&parsed.embeddings)?;
            Ok(parsed.embeddings)
        }
    }

    fn post(&self, path: &str, body: &serde_json::Value) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.key)
            .json(body)
            .send()
            .map_err(|e| CortexError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_http_status(status.as_u16(), &url));
        }
        response
            .text()
            .map_err(|e| CortexError::Transport(format!("{url}: {e}")))
    }
}

/// Map a non-success HTTP status onto the provider error taxonomy.
pub fn map_http_status(status: u16, url: &str) -> CortexError {
    match status {
        401 | 403 => CortexError::AuthFailed(format!("{url} returned {status}")),
        429 => CortexError::RateLimited(format!("{url} returned 429")),
        other => CortexError::Transport(format!("{url} returned {other}")),
    }
}

fn validate_dimensions(embeddings: &[Vec<f64>]) -> Result<()> {
    for embedding in embeddings {
        if embedding.len() != REMOTE_DIMENSIONS {
            return Err(CortexError::MalformedResponse(format!(
                "expected {REMOTE_DIMENSIONS}-dim embedding, got {}",
                embedding.len()
            )));
        }
    }
    Ok(())
}
