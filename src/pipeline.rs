//! Pipeline orchestration: collection → parsing → embedding → indexing →
//! persistence.
//!
//! One logical pipeline per invocation. Per-input parse failures and
//! unsupported formats are logged and skipped; source, embedding, and
//! persistence failures abort the run, in which case no store directory is
//! reported. The state machine is
//! `Collecting → Parsing → Embedding → Indexing → Persisted`, with
//! `Failed` reachable from every non-terminal state.

use tracing::{error, info, warn};

use crate::config::Config;
use crate::document::{Document, RawInput};
use crate::embedding::EmbeddingClient;
use crate::error::{PipelineError, Result};
use crate::parser::ParserRegistry;
use crate::sources::{build_collectors, SourceCollector};
use crate::store::{RunLog, StoreDirectory, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Collecting,
    Parsing,
    Embedding,
    Indexing,
    Persisted,
    Failed,
}

#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    registry: ParserRegistry,
    collectors: Vec<Box<dyn SourceCollector>>,
}

impl Pipeline {
    /// Assemble a pipeline with the built-in parsers and one collector per
    /// configured source. Fails before any work starts if the
    /// configuration is unusable.
    pub fn from_config(config: Config) -> Result<Self> {
        crate::config::validate(&config)?;
        let collectors = build_collectors(&config.sources)?;
        Ok(Self {
            config,
            registry: ParserRegistry::with_defaults(),
            collectors,
        })
    }

    /// Replace or extend format support before running.
    pub fn registry_mut(&mut self) -> &mut ParserRegistry {
        &mut self.registry
    }

    /// Run the full pipeline and return the created store directory.
    pub async fn run(&self) -> Result<StoreDirectory> {
        match self.run_inner().await {
            Ok(dir) => Ok(dir),
            Err(e) => {
                error!(state = ?PipelineState::Failed, error = %e, "pipeline run failed");
                Err(e)
            }
        }
    }

    async fn run_inner(&self) -> Result<StoreDirectory> {
        let mut run_log = RunLog::new();

        // Collecting: every source is exhausted before parsing moves on.
        transition(PipelineState::Collecting);
        let mut raw_inputs: Vec<(String, RawInput)> = Vec::new();
        for collector in &self.collectors {
            let inputs =
                collector
                    .collect()
                    .await
                    .map_err(|e| PipelineError::Source {
                        source_name: collector.name().to_string(),
                        reason: e.to_string(),
                    })?;
            info!(source = collector.name(), inputs = inputs.len(), "source collected");
            run_log.record(format!(
                "collected {} inputs from source '{}'",
                inputs.len(),
                collector.name()
            ));
            raw_inputs.extend(
                inputs
                    .into_iter()
                    .map(|i| (collector.name().to_string(), i)),
            );
        }

        // Parsing: per-input failures are skipped, never fatal.
        transition(PipelineState::Parsing);
        let mut documents: Vec<Document> = Vec::new();
        let mut skipped = 0usize;
        for (source, input) in &raw_inputs {
            let parser = match self.registry.lookup(&input.discriminator) {
                Ok(parser) => parser,
                Err(e) => {
                    warn!(
                        source = %source,
                        input = %input.source_id(),
                        error = %e,
                        "input skipped"
                    );
                    skipped += 1;
                    continue;
                }
            };
            let mut docs = parser.parse(input);
            if docs.is_empty() {
                let e = PipelineError::Parse {
                    source_id: input.source_id(),
                    reason: "no text extracted".to_string(),
                };
                warn!(source = %source, error = %e, "input skipped");
                skipped += 1;
                continue;
            }
            if let Some(session_id) = &self.config.store.session_id {
                for doc in &mut docs {
                    doc.metadata
                        .insert("session_id".to_string(), session_id.clone().into());
                }
            }
            documents.append(&mut docs);
        }
        info!(
            documents = documents.len(),
            skipped, "parsing complete"
        );
        run_log.record(format!(
            "parsed {} documents ({} inputs skipped)",
            documents.len(),
            skipped
        ));

        if documents.is_empty() {
            return Err(PipelineError::Config(
                "no documents were collected from the configured sources".to_string(),
            ));
        }

        // Embedding: fatal after one retry per chunk.
        transition(PipelineState::Embedding);
        let texts: Vec<String> = documents.iter().map(|d| d.text.clone()).collect();
        let client = EmbeddingClient::new(self.config.embedding.clone())?;
        info!(documents = texts.len(), "requesting embeddings");
        let embeddings = client.embed_documents(&texts).await?;
        run_log.record(format!(
            "embedded {} documents (dimension {})",
            embeddings.len(),
            embeddings.first().map(Vec::len).unwrap_or(0)
        ));

        // Indexing + persistence.
        transition(PipelineState::Indexing);
        let store = VectorStore::build(documents, embeddings)?;
        run_log.record(format!(
            "built flat L2 index: {} vectors, dimension {}",
            store.len(),
            store.dim()
        ));

        let dir = store.persist(
            &self.config.store.path,
            &self.config.store.name,
            &run_log,
        )?;
        transition(PipelineState::Persisted);
        Ok(dir)
    }
}

fn transition(state: PipelineState) {
    info!(state = ?state, "pipeline state");
}
