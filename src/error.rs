//! Error taxonomy for the ingestion pipeline.
//!
//! Two classes of failure flow through the pipeline:
//!
//! - **Per-input** ([`PipelineError::UnsupportedFormat`], [`PipelineError::Parse`]):
//!   the offending input is logged and skipped; the run continues with
//!   partial results.
//! - **Fatal** (everything else): the run aborts, no store directory is
//!   reported as successful, and the error carries enough context (failing
//!   chunk index range, attempted store path) to retry externally.

use thiserror::Error;

/// All errors surfaced by the pipeline and its components.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No parser is registered for the input's discriminator. Per-input.
    #[error("unsupported format: '{discriminator}'")]
    UnsupportedFormat { discriminator: String },

    /// An input was dispatched but yielded no documents (unreadable or no
    /// extractable text). Per-input.
    #[error("failed to parse '{source_id}': {reason}")]
    Parse { source_id: String, reason: String },

    /// A source collector failed outright (clone error, unreachable root).
    /// Fatal: the run would otherwise silently index a partial corpus.
    #[error("source '{source_name}' failed: {reason}")]
    Source { source_name: String, reason: String },

    /// The embedding endpoint failed a chunk even after one retry.
    /// Fatal; carries the input indices of the failing chunk.
    #[error("embedding service failed for inputs {first_index}..={last_index}: {reason}")]
    Embedding {
        first_index: usize,
        last_index: usize,
        reason: String,
    },

    /// Index construction or store persistence failed. Fatal.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Invalid or incomplete configuration. Fails before the pipeline starts.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
