//! Batched HTTP embedding client.
//!
//! Sends document texts to an embedding endpoint in consecutive chunks of
//! at most `batch_size` and concatenates the results in chunk order, so
//! output vectors line up one-to-one with input texts.
//!
//! Request body: `{ "input": ["...", ...], ...model_params }`.
//! Response body: `{ "data": [ { "embedding": [...] } | [...], ... ] }`,
//! positionally aligned with the request.
//!
//! A chunk is retried at most once. A second failure aborts the run with
//! the failing chunk's input index range; partial embedding state is
//! discarded by the caller. Vectors are returned as-is, no normalization.

use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{PipelineError, Result as PipelineResult};

pub struct EmbeddingClient {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingConfig) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Embed every text, one vector per input, same order.
    pub async fn embed_documents(&self, texts: &[String]) -> PipelineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.batch_size;
        let mut vectors = Vec::with_capacity(texts.len());

        for (chunk_index, chunk) in texts.chunks(batch_size).enumerate() {
            let first_index = chunk_index * batch_size;
            let last_index = first_index + chunk.len() - 1;

            let chunk_vectors = match self.embed_chunk(chunk).await {
                Ok(v) => v,
                Err(first_err) => {
                    warn!(
                        first_index,
                        last_index,
                        error = %first_err,
                        "embedding chunk failed, retrying once"
                    );
                    self.embed_chunk(chunk).await.map_err(|e| {
                        PipelineError::Embedding {
                            first_index,
                            last_index,
                            reason: e.to_string(),
                        }
                    })?
                }
            };
            vectors.extend(chunk_vectors);
        }

        Ok(vectors)
    }

    async fn embed_chunk(&self, chunk: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut body = serde_json::Map::new();
        body.insert("input".to_string(), Value::from(chunk.to_vec()));
        for (key, value) in &self.config.model_params {
            body.insert(key.clone(), value.clone());
        }

        debug!(
            endpoint = %self.config.endpoint,
            texts = chunk.len(),
            "sending embedding request"
        );
        let started = Instant::now();

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&Value::Object(body))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!(
                "embedding endpoint returned {}: {}",
                status,
                body_text.trim()
            );
        }

        let json: Value = response.json().await?;
        let vectors = parse_embedding_response(&json, chunk.len())?;
        debug!(
            texts = chunk.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "embedding response received"
        );
        Ok(vectors)
    }
}

/// Extract `data[].embedding` (or bare `data[]` arrays) in positional
/// order. A count mismatch is an error: the caller must be able to rely on
/// one vector per input.
fn parse_embedding_response(json: &Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("malformed embedding response: missing 'data' array"))?;

    let mut vectors = Vec::with_capacity(data.len());
    for item in data {
        let values = match item {
            Value::Array(values) => values,
            Value::Object(obj) => obj
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| anyhow!("malformed embedding response: entry without 'embedding'"))?,
            _ => bail!("malformed embedding response: unexpected entry type"),
        };
        let vector: Vec<f32> = values
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| anyhow!("malformed embedding response: non-numeric component"))
            })
            .collect::<Result<_>>()?;
        vectors.push(vector);
    }

    if vectors.len() != expected {
        bail!(
            "embedding count mismatch: expected {}, got {}",
            expected,
            vectors.len()
        );
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_object_entries() {
        let json = json!({"data": [{"embedding": [1.0, 2.0]}, {"embedding": [3.0, 4.0]}]});
        let vectors = parse_embedding_response(&json, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 2.0], vec![3.0, 4.0]]);
    }

    #[test]
    fn parses_bare_array_entries() {
        let json = json!({"data": [[0.5, -0.5]]});
        let vectors = parse_embedding_response(&json, 1).unwrap();
        assert_eq!(vectors, vec![vec![0.5, -0.5]]);
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let json = json!({"data": [{"embedding": [1.0]}]});
        let err = parse_embedding_response(&json, 2).unwrap_err();
        assert!(err.to_string().contains("count mismatch"));
    }

    #[test]
    fn missing_data_is_an_error() {
        let err = parse_embedding_response(&json!({"ok": true}), 1).unwrap_err();
        assert!(err.to_string().contains("missing 'data'"));
    }

    #[test]
    fn non_numeric_component_is_an_error() {
        let json = json!({"data": [{"embedding": [1.0, "nope"]}]});
        assert!(parse_embedding_response(&json, 1).is_err());
    }

    #[tokio::test]
    async fn empty_input_needs_no_endpoint() {
        let client = EmbeddingClient::new(EmbeddingConfig::default()).unwrap();
        let vectors = client.embed_documents(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }
}
