//! TOML configuration parsing and validation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base directory under which store directories are created.
    pub path: PathBuf,
    /// Desired store name; a random suffix is appended on collision.
    pub name: String,
    /// Optional identifier recorded in every document's metadata.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra fields forwarded verbatim in every request body
    /// (e.g. `model = "nomic-embed-text"`).
    #[serde(default)]
    pub model_params: BTreeMap<String, serde_json::Value>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            model_params: BTreeMap::new(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8001/v1/embeddings".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    pub filesystem: Option<FilesystemSourceConfig>,
    pub git: Option<GitSourceConfig>,
    pub wiki: Option<WikiSourceConfig>,
}

impl SourcesConfig {
    pub fn is_empty(&self) -> bool {
        self.filesystem.is_none() && self.git.is_none() && self.wiki.is_none()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    /// File or directory to ingest.
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitSourceConfig {
    pub url: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Lower-cased extensions (without dot) to include. Empty means all.
    #[serde(default)]
    pub include_extensions: Vec<String>,
    /// Extensions to exclude; takes precedence over `include_extensions`.
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    #[serde(default)]
    pub max_files: Option<usize>,
    #[serde(default = "default_shallow")]
    pub shallow: bool,
}

fn default_shallow() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct WikiSourceConfig {
    /// Base URL of the wiki instance (e.g. `https://example.atlassian.net/wiki`).
    pub base_url: String,
    pub user: String,
    pub token: String,
    pub space_key: String,
    #[serde(default)]
    pub max_pages: Option<usize>,
    /// Pages requested per listing call.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

fn default_page_limit() -> usize {
    50
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| PipelineError::Config(format!("failed to parse config file: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.sources.is_empty() {
        return Err(PipelineError::Config(
            "no sources configured: provide at least one of [sources.filesystem], \
             [sources.git], [sources.wiki]"
                .to_string(),
        ));
    }
    if config.embedding.batch_size == 0 {
        return Err(PipelineError::Config(
            "embedding.batch_size must be > 0".to_string(),
        ));
    }
    if config.embedding.endpoint.trim().is_empty() {
        return Err(PipelineError::Config(
            "embedding.endpoint must not be empty".to_string(),
        ));
    }
    if config.store.name.is_empty()
        || config.store.name.contains('/')
        || config.store.name.contains('\\')
    {
        return Err(PipelineError::Config(
            "store.name must be non-empty and must not contain path separators".to_string(),
        ));
    }
    if let Some(wiki) = &config.sources.wiki {
        if wiki.page_limit == 0 {
            return Err(PipelineError::Config(
                "sources.wiki.page_limit must be > 0".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config =
            toml::from_str(toml_str).map_err(|e| PipelineError::Config(e.to_string()))?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_filesystem_config_parses() {
        let config = parse(
            r#"
            [store]
            path = "./stores"
            name = "docs"

            [sources.filesystem]
            root = "./docs"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.name, "docs");
        assert_eq!(config.embedding.batch_size, 32);
        assert!(config.sources.filesystem.is_some());
    }

    #[test]
    fn no_sources_is_rejected() {
        let err = parse(
            r#"
            [store]
            path = "./stores"
            name = "docs"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = parse(
            r#"
            [store]
            path = "./stores"
            name = "docs"

            [embedding]
            batch_size = 0

            [sources.filesystem]
            root = "./docs"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn store_name_with_separator_is_rejected() {
        let err = parse(
            r#"
            [store]
            path = "./stores"
            name = "a/b"

            [sources.filesystem]
            root = "./docs"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("path separators"));
    }

    #[test]
    fn model_params_are_forwarded() {
        let config = parse(
            r#"
            [store]
            path = "./stores"
            name = "docs"

            [embedding]
            endpoint = "http://localhost:9999/embed"
            [embedding.model_params]
            model = "nomic-embed-text"

            [sources.git]
            url = "https://example.com/repo.git"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.embedding.model_params.get("model").unwrap(),
            "nomic-embed-text"
        );
        let git = config.sources.git.unwrap();
        assert!(git.shallow);
        assert!(git.branch.is_none());
    }
}
