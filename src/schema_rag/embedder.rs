//! Schema Embedder
//!
//! Embeds registry texts and questions using an OpenAI-compatible
//! embeddings API.

use crate::config::LlmConfig;
use crate::error::{Result, SqlRagError};
use crate::schema_rag::vector_store::Embedding;
use async_trait::async_trait;
use std::time::Duration;

/// Turns texts into embedding vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        self.embed(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| SqlRagError::Retrieval("Embedding service returned no vector".to_string()))
    }
}

/// Embedding client using OpenAI API
pub struct SchemaEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String, // e.g., "text-embedding-3-small"
    timeout: Duration,
}

impl SchemaEmbedder {
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.embedding_model.clone(),
            timeout: config.embedding_timeout,
        }
    }
}

#[async_trait]
impl Embedder for SchemaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SqlRagError::Retrieval(format!(
                        "Embedding API call timed out after {}s",
                        self.timeout.as_secs()
                    ))
                } else {
                    SqlRagError::Retrieval(format!("Embedding API call failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SqlRagError::Retrieval(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let response_json: serde_json::Value = response.json().await.map_err(|e| {
            SqlRagError::Retrieval(format!("Failed to parse embedding response: {}", e))
        })?;

        parse_embeddings(&response_json, texts.len())
    }
}

/// Extract vectors from an `/embeddings` response, honouring each item's
/// `index` so the output lines up with the request inputs.
fn parse_embeddings(response: &serde_json::Value, expected: usize) -> Result<Vec<Embedding>> {
    let data = response
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| SqlRagError::Retrieval("No embedding data in response".to_string()))?;

    if data.len() != expected {
        return Err(SqlRagError::Retrieval(format!(
            "Embedding response has {} vectors, expected {}",
            data.len(),
            expected
        )));
    }

    let mut embeddings: Vec<Option<Embedding>> = vec![None; expected];
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);

        let vector: Embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| SqlRagError::Retrieval("No embedding vector in response".to_string()))?
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();

        match embeddings.get_mut(index) {
            Some(slot) => *slot = Some(vector),
            None => {
                return Err(SqlRagError::Retrieval(format!(
                    "Embedding index {} out of range",
                    index
                )))
            }
        }
    }

    embeddings
        .into_iter()
        .enumerate()
        .map(|(i, e)| {
            e.ok_or_else(|| SqlRagError::Retrieval(format!("Missing embedding for input {}", i)))
        })
        .collect()
}
