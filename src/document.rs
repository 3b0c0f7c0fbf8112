//! Core value types flowing through the ingestion pipeline.
//!
//! A [`RawInput`] is what a source collector hands to the parser registry;
//! a [`Document`] is the parsed unit of text plus traceability metadata
//! that the embedding client and store builder operate on.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Ordered metadata map attached to raw inputs and documents.
///
/// Values are scalars by construction (strings, numbers, booleans); the
/// map is persisted verbatim into the store's metadata artifact.
pub type Metadata = BTreeMap<String, Value>;

/// A unit of extracted text plus metadata describing its origin.
///
/// Immutable after creation. Typical metadata keys are `file_path`,
/// `page_id`, `sheet_name`, or `session_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// The content a collector produced: either a file on disk (possibly
/// binary, e.g. a PDF) or text already fetched (e.g. a wiki page body).
#[derive(Debug, Clone)]
pub enum RawPayload {
    File(PathBuf),
    Inline(String),
}

/// A raw item produced by a source collector, not yet parsed.
///
/// The `discriminator` selects the parsing strategy: for files it is the
/// lower-cased extension (`txt`, `pdf`, ...); fetched content carries a
/// type tag such as `html`. `metadata` is merged into every [`Document`]
/// the parser produces from this input.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub payload: RawPayload,
    pub discriminator: String,
    pub metadata: Metadata,
}

impl RawInput {
    /// Build a file input, deriving the discriminator from the extension.
    /// Extension-less files get an empty discriminator and are skipped at
    /// dispatch time.
    pub fn file(path: PathBuf, metadata: Metadata) -> Self {
        let discriminator = discriminator_for_path(&path);
        Self {
            payload: RawPayload::File(path),
            discriminator,
            metadata,
        }
    }

    /// Build an inline input with an explicit discriminator.
    pub fn inline(
        content: impl Into<String>,
        discriminator: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            payload: RawPayload::Inline(content.into()),
            discriminator: discriminator.into().to_ascii_lowercase(),
            metadata,
        }
    }

    /// Human-readable label used in log lines when this input is skipped.
    pub fn source_id(&self) -> String {
        match &self.payload {
            RawPayload::File(path) => path.display().to_string(),
            RawPayload::Inline(_) => self
                .metadata
                .get("page_id")
                .or_else(|| self.metadata.get("title"))
                .and_then(Value::as_str)
                .unwrap_or("<inline>")
                .to_string(),
        }
    }
}

/// Lower-cased file extension, or empty for extension-less paths.
pub fn discriminator_for_path(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discriminator_is_lowercased_extension() {
        assert_eq!(discriminator_for_path(Path::new("a/b/Readme.MD")), "md");
        assert_eq!(discriminator_for_path(Path::new("notes.txt")), "txt");
        assert_eq!(discriminator_for_path(Path::new("Makefile")), "");
    }

    #[test]
    fn inline_input_reports_page_id() {
        let mut meta = Metadata::new();
        meta.insert("page_id".to_string(), Value::from("12345"));
        let input = RawInput::inline("<p>hi</p>", "HTML", meta);
        assert_eq!(input.discriminator, "html");
        assert_eq!(input.source_id(), "12345");
    }

    #[test]
    fn file_input_reports_path() {
        let input = RawInput::file(PathBuf::from("docs/guide.txt"), Metadata::new());
        assert_eq!(input.discriminator, "txt");
        assert!(input.source_id().ends_with("guide.txt"));
    }
}
