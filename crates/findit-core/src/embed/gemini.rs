//! Gemini text embedding provider, reached over HTTP.
//!
//! The only remote provider of the three — it degrades to a transient
//! error (never a fatal one) on missing network or non-2xx response, so
//! the indexer falls back to the next available provider rather than
//! failing the whole file (see the Network Resilience component).

use crate::embed::{l2_normalize, EMBEDDING_DIM};
use crate::embed::ApiKey;
use crate::error::{FindItError, Result};
use serde::{Deserialize, Serialize};

const ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";

pub struct GeminiEmbedder {
    api_key: Option<ApiKey>,
    client: reqwest::blocking::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    content: Content<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Embedding,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GeminiEmbedder {
    pub fn new(api_key: Option<ApiKey>) -> Self {
        Self {
            api_key,
            client: reqwest::blocking::Client::new(),
            endpoint: ENDPOINT.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(api_key: Option<ApiKey>, endpoint: String) -> Self {
        Self {
            api_key,
            client: reqwest::blocking::Client::new(),
            endpoint,
        }
    }

    pub fn has_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn embed_text(&mut self, text: &str) -> Result<Vec<f32>> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| FindItError::Validation("no Gemini API key configured".into()))?;

        let body = EmbedRequest {
            content: Content {
                parts: vec![Part { text }],
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", key.as_str())])
            .json(&body)
            .send()
            .map_err(|e| FindItError::Transient(format!("Gemini request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(FindItError::Transient(format!(
                "Gemini returned status {}",
                response.status()
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .map_err(|e| FindItError::Transient(format!("Gemini response malformed: {e}")))?;

        let mut values = parsed.embedding.values;
        values.truncate(EMBEDDING_DIM);
        l2_normalize(&mut values);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_key_reflects_constructor_arg() {
        assert!(!GeminiEmbedder::new(None).has_key());
        assert!(GeminiEmbedder::new(Some(ApiKey::new("k"))).has_key());
    }

    #[test]
    fn embed_text_without_key_is_validation_error() {
        let mut embedder = GeminiEmbedder::new(None);
        let err = embedder.embed_text("sunset").unwrap_err();
        assert!(matches!(err, FindItError::Validation(_)));
    }

    #[test]
    fn embed_text_against_unreachable_endpoint_is_transient() {
        let mut embedder =
            GeminiEmbedder::with_endpoint(Some(ApiKey::new("k")), "http://127.0.0.1:1/embed".into());
        let err = embedder.embed_text("sunset").unwrap_err();
        assert!(err.is_transient());
    }
}
