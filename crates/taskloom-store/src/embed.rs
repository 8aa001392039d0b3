use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Expected embedding dimensionality.
pub const EXPECTED_DIM: usize = 1536;

/// How long a cached vector stays valid.
pub const CACHE_TTL_DAYS: i64 = 7;

/// Embedding provider boundary (external collaborator).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>>;
}

/// Reject vectors of the wrong shape before they reach the store.
pub fn validate_vector(vector: &[f32], expected_dim: usize) -> Result<()> {
    if vector.len() != expected_dim {
        return Err(Error::Validation(format!(
            "embedding has {} dimensions, expected {}",
            vector.len(),
            expected_dim
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::Validation("embedding contains NaN or Inf".to_string()));
    }
    Ok(())
}

/// Content-addressed embedding cache with TTL.
///
/// Keyed by SHA-256 of the sub-chunk text, so identical content across
/// tasks and across reindex runs reuses one provider call.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<String, CachedVector>,
    ttl: Option<Duration>,
}

#[derive(Debug, Clone)]
struct CachedVector {
    vector: Vec<f32>,
    stored_at: DateTime<Utc>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Some(Duration::days(CACHE_TTL_DAYS)),
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn cache_key(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<Vec<f32>> {
        let cached = self.entries.get(key)?;
        if let Some(ttl) = self.ttl
            && now - cached.stored_at > ttl
        {
            return None;
        }
        Some(cached.vector.clone())
    }

    pub fn put(&mut self, key: String, vector: Vec<f32>, now: DateTime<Utc>) {
        self.entries.insert(
            key,
            CachedVector {
                vector,
                stored_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// HTTP embedding client speaking the common `{model, input}` shape.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(serde::Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(serde::Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedder {
    async fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbedRequest { model, input })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!(
                "provider returned {}: {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embedding)
    }
}
