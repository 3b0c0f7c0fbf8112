//! Source collector abstraction.
//!
//! A collector scans one external source (filesystem tree, Git repository,
//! wiki space) and returns the [`RawInput`]s the parser registry will turn
//! into documents. The orchestrator depends only on this trait.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::SourcesConfig;
use crate::connector_fs::FilesystemCollector;
use crate::connector_git::GitCollector;
use crate::connector_wiki::WikiCollector;
use crate::document::RawInput;
use crate::error::{PipelineError, Result as PipelineResult};

/// A data source that produces raw inputs for ingestion.
#[async_trait]
pub trait SourceCollector: Send + Sync + std::fmt::Debug {
    /// Source label used in logs and error messages (`"filesystem"`, ...).
    fn name(&self) -> &str;

    /// Scan the source. Order must be stable across runs of the same
    /// source; a returned error is fatal to the run.
    async fn collect(&self) -> Result<Vec<RawInput>>;
}

/// Instantiate one collector per configured source, in fixed order
/// (filesystem, git, wiki). Errors if nothing is configured.
pub fn build_collectors(sources: &SourcesConfig) -> PipelineResult<Vec<Box<dyn SourceCollector>>> {
    let mut collectors: Vec<Box<dyn SourceCollector>> = Vec::new();
    if let Some(fs) = &sources.filesystem {
        collectors.push(Box::new(FilesystemCollector::new(fs.clone())));
    }
    if let Some(git) = &sources.git {
        collectors.push(Box::new(GitCollector::new(git.clone())));
    }
    if let Some(wiki) = &sources.wiki {
        collectors.push(Box::new(WikiCollector::new(wiki.clone())));
    }
    if collectors.is_empty() {
        return Err(PipelineError::Config(
            "no sources configured".to_string(),
        ));
    }
    Ok(collectors)
}
