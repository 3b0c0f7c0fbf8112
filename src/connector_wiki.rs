//! Wiki space source collector.
//!
//! Fetches pages from a Confluence-style REST API (`/rest/api/content`)
//! with basic auth and cursorless `start`/`limit` pagination. Page bodies
//! arrive in storage (HTML) format and are emitted as inline inputs with
//! the `html` discriminator; the registry's HTML parser turns them into
//! plain-text documents.
//!
//! Malformed entries within a listing are logged and skipped; a failed
//! listing request is an error (a silently half-fetched space would be
//! indexed as if complete).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WikiSourceConfig;
use crate::document::{Metadata, RawInput};
use crate::sources::SourceCollector;

#[derive(Debug)]
pub struct WikiCollector {
    config: WikiSourceConfig,
    client: reqwest::Client,
}

impl WikiCollector {
    pub fn new(config: WikiSourceConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn auth_header(&self) -> String {
        let credentials = format!("{}:{}", self.config.user, self.config.token);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(credentials)
        )
    }

    async fn fetch_listing(&self, start: usize, limit: usize) -> Result<Value> {
        let url = format!(
            "{}/rest/api/content",
            self.config.base_url.trim_end_matches('/')
        );
        let start_param = start.to_string();
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .query(&[
                ("spaceKey", self.config.space_key.as_str()),
                ("type", "page"),
                ("status", "current"),
                ("expand", "body.storage"),
                ("start", start_param.as_str()),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("wiki listing request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("wiki listing returned {}: {}", status, body.trim());
        }
        response
            .json()
            .await
            .context("wiki listing returned malformed JSON")
    }
}

#[async_trait]
impl SourceCollector for WikiCollector {
    fn name(&self) -> &str {
        "wiki"
    }

    async fn collect(&self) -> Result<Vec<RawInput>> {
        let mut inputs = Vec::new();
        let mut start = 0usize;
        let limit = self.config.page_limit;

        loop {
            let remaining = self
                .config
                .max_pages
                .map(|max| max.saturating_sub(inputs.len()))
                .unwrap_or(usize::MAX);
            if remaining == 0 {
                break;
            }

            let listing = self.fetch_listing(start, limit.min(remaining)).await?;
            let mut batch = page_inputs_from_listing(&listing, &self.config);
            let fetched = listing
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            debug!(start, fetched, usable = batch.len(), "wiki listing page");
            inputs.append(&mut batch);

            if fetched < limit.min(remaining) || fetched == 0 {
                break;
            }
            start += fetched;
        }

        info!(
            space = %self.config.space_key,
            pages = inputs.len(),
            "wiki space scan complete"
        );
        Ok(inputs)
    }
}

/// Convert one listing response into raw inputs. Entries missing an id or
/// a body are logged and skipped.
fn page_inputs_from_listing(listing: &Value, config: &WikiSourceConfig) -> Vec<RawInput> {
    let Some(results) = listing.get("results").and_then(Value::as_array) else {
        warn!("wiki listing has no 'results' array");
        return Vec::new();
    };

    let mut inputs = Vec::new();
    for page in results {
        let Some(page_id) = page.get("id").and_then(Value::as_str) else {
            warn!("wiki page entry without id, skipping");
            continue;
        };
        let title = page.get("title").and_then(Value::as_str).unwrap_or("");
        let Some(body) = page
            .pointer("/body/storage/value")
            .and_then(Value::as_str)
        else {
            warn!(page_id, title, "wiki page without storage body, skipping");
            continue;
        };

        let mut metadata = Metadata::new();
        metadata.insert("page_id".to_string(), page_id.into());
        metadata.insert("title".to_string(), title.into());
        metadata.insert("space_key".to_string(), config.space_key.clone().into());
        metadata.insert("source".to_string(), "wiki".into());
        metadata.insert(
            "url".to_string(),
            format!("{}/pages/{}", config.base_url.trim_end_matches('/'), page_id).into(),
        );
        inputs.push(RawInput::inline(body, "html", metadata));
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> WikiSourceConfig {
        WikiSourceConfig {
            base_url: "https://wiki.example.com/".to_string(),
            user: "bot".to_string(),
            token: "secret".to_string(),
            space_key: "ENG".to_string(),
            max_pages: None,
            page_limit: 50,
        }
    }

    #[test]
    fn listing_entries_become_inline_html_inputs() {
        let listing = json!({
            "results": [
                {
                    "id": "101",
                    "title": "Runbook",
                    "body": { "storage": { "value": "<p>restart the thing</p>" } }
                },
                {
                    "id": "102",
                    "title": "No body page"
                }
            ],
            "size": 2
        });
        let inputs = page_inputs_from_listing(&listing, &config());
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].discriminator, "html");
        assert_eq!(inputs[0].metadata.get("page_id").unwrap(), "101");
        assert_eq!(
            inputs[0].metadata.get("url").unwrap(),
            "https://wiki.example.com/pages/101"
        );
    }

    #[test]
    fn listing_without_results_yields_nothing() {
        let inputs = page_inputs_from_listing(&json!({"oops": true}), &config());
        assert!(inputs.is_empty());
    }

    #[test]
    fn auth_header_is_basic() {
        let collector = WikiCollector::new(config());
        let header = collector.auth_header();
        assert!(header.starts_with("Basic "));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(header.trim_start_matches("Basic "))
            .unwrap();
        assert_eq!(decoded, b"bot:secret");
    }
}
