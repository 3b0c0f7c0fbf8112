//! Flat exact-search vector store: construction, persistence, reading.
//!
//! A store pairs a brute-force L2 index with a metadata table in one
//! directory. IDs are assigned `0..n-1` in embed order and join the two
//! artifacts: the index's id `i` corresponds exactly to the metadata
//! array's i-th record.
//!
//! ## Directory layout
//!
//! - `index.vec` — magic `VFI1`, `u32` LE dimension, `u64` LE count,
//!   then `count × dim` little-endian `f32` values, row-major.
//! - `metadata.json` — JSON array of `{ "id", "text", ...metadata }`
//!   objects, positionally aligned with the index.
//! - `run.log` — timestamped summary of the run that produced the store.
//!
//! A name collision under the base path is resolved by appending a short
//! random suffix (bounded attempts). The existence check plus suffix is
//! best-effort: two concurrent runs racing on the same generated suffix
//! are not protected against. Existing stores are never mutated.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::document::{Document, Metadata};
use crate::error::{PipelineError, Result};

pub const INDEX_FILE: &str = "index.vec";
pub const METADATA_FILE: &str = "metadata.json";
pub const RUN_LOG_FILE: &str = "run.log";

const INDEX_MAGIC: [u8; 4] = *b"VFI1";
const MAX_NAME_ATTEMPTS: usize = 16;
const SUFFIX_LEN: usize = 6;

/// One row of the metadata table. `metadata` keys are flattened next to
/// `id` and `text` in the persisted JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: u64,
    pub text: String,
    #[serde(flatten)]
    pub metadata: Metadata,
}

/// The persisted unit: a uniquely named directory holding the index and
/// metadata artifacts.
#[derive(Debug, Clone)]
pub struct StoreDirectory {
    /// Final directory name; differs from the requested name if a
    /// collision was resolved.
    pub name: String,
    pub path: PathBuf,
}

/// In-memory flat L2 index plus its parallel metadata table.
#[derive(Debug)]
pub struct VectorStore {
    dim: usize,
    vectors: Vec<Vec<f32>>,
    records: Vec<MetadataRecord>,
}

impl VectorStore {
    /// Build a store from parallel document and embedding sequences,
    /// assigning ids `0..n-1` in input order.
    pub fn build(documents: Vec<Document>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if documents.len() != embeddings.len() {
            return Err(PipelineError::Persistence(format!(
                "document count ({}) does not match embedding count ({})",
                documents.len(),
                embeddings.len()
            )));
        }
        if embeddings.is_empty() {
            return Err(PipelineError::Persistence(
                "cannot build a store from zero embeddings".to_string(),
            ));
        }
        let dim = embeddings[0].len();
        if dim == 0 {
            return Err(PipelineError::Persistence(
                "embedding dimensionality is zero".to_string(),
            ));
        }
        for (i, vector) in embeddings.iter().enumerate() {
            if vector.len() != dim {
                return Err(PipelineError::Persistence(format!(
                    "embedding {} has dimension {}, expected {}",
                    i,
                    vector.len(),
                    dim
                )));
            }
        }

        let records = documents
            .into_iter()
            .enumerate()
            .map(|(id, doc)| {
                let mut metadata = doc.metadata;
                // `id` and `text` are reserved columns of the table.
                for reserved in ["id", "text"] {
                    if metadata.remove(reserved).is_some() {
                        warn!(id, reserved, "metadata key shadows a reserved column, dropped");
                    }
                }
                MetadataRecord {
                    id: id as u64,
                    text: doc.text,
                    metadata,
                }
            })
            .collect();

        debug!(count = embeddings.len(), dim, "built flat index");
        Ok(Self {
            dim,
            vectors: embeddings,
            records,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn records(&self) -> &[MetadataRecord] {
        &self.records
    }

    pub fn vector(&self, id: u64) -> Option<&[f32]> {
        self.vectors.get(id as usize).map(Vec::as_slice)
    }

    /// Exact k-nearest search by Euclidean distance over every stored
    /// vector. Returns `(id, distance)` pairs, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(u64, f32)> {
        if query.len() != self.dim {
            warn!(
                got = query.len(),
                expected = self.dim,
                "query dimension mismatch"
            );
            return Vec::new();
        }
        let mut scored: Vec<(u64, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| (id as u64, l2_distance(query, v)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        scored
    }

    /// Write the store under `base_path` as a new directory named `name`,
    /// or `name` plus a random suffix if that directory already exists.
    pub fn persist(&self, base_path: &Path, name: &str, run_log: &RunLog) -> Result<StoreDirectory> {
        std::fs::create_dir_all(base_path).map_err(|e| {
            PipelineError::Persistence(format!(
                "failed to create base path {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let dir = claim_store_dir(base_path, name)?;

        self.write_index(&dir.path.join(INDEX_FILE))?;
        self.write_metadata(&dir.path.join(METADATA_FILE))?;
        std::fs::write(dir.path.join(RUN_LOG_FILE), run_log.contents()).map_err(|e| {
            PipelineError::Persistence(format!("failed to write {}: {}", RUN_LOG_FILE, e))
        })?;

        info!(
            store = %dir.name,
            path = %dir.path.display(),
            vectors = self.len(),
            dim = self.dim,
            "store persisted"
        );
        Ok(dir)
    }

    fn write_index(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| PipelineError::Persistence(format!("failed to create index: {}", e)))?;
        let mut writer = BufWriter::new(file);
        let io_err =
            |e: std::io::Error| PipelineError::Persistence(format!("failed to write index: {}", e));

        writer.write_all(&INDEX_MAGIC).map_err(io_err)?;
        writer
            .write_all(&(self.dim as u32).to_le_bytes())
            .map_err(io_err)?;
        writer
            .write_all(&(self.vectors.len() as u64).to_le_bytes())
            .map_err(io_err)?;
        for vector in &self.vectors {
            for &value in vector {
                writer.write_all(&value.to_le_bytes()).map_err(io_err)?;
            }
        }
        writer.flush().map_err(io_err)
    }

    fn write_metadata(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| PipelineError::Persistence(format!("failed to create metadata: {}", e)))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.records)
            .map_err(|e| PipelineError::Persistence(format!("failed to write metadata: {}", e)))
    }

    /// Read a persisted store back, validating artifact integrity and the
    /// index ↔ metadata correspondence.
    pub fn open(dir: &Path) -> Result<Self> {
        let (dim, vectors) = read_index(&dir.join(INDEX_FILE))?;

        let file = File::open(dir.join(METADATA_FILE))
            .map_err(|e| PipelineError::Persistence(format!("failed to open metadata: {}", e)))?;
        let records: Vec<MetadataRecord> = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PipelineError::Persistence(format!("malformed metadata: {}", e)))?;

        if records.len() != vectors.len() {
            return Err(PipelineError::Persistence(format!(
                "metadata has {} records but index has {} vectors",
                records.len(),
                vectors.len()
            )));
        }
        for (i, record) in records.iter().enumerate() {
            if record.id != i as u64 {
                return Err(PipelineError::Persistence(format!(
                    "metadata record {} has id {}",
                    i, record.id
                )));
            }
        }

        Ok(Self {
            dim,
            vectors,
            records,
        })
    }
}

fn read_index(path: &Path) -> Result<(usize, Vec<Vec<f32>>)> {
    let bytes = std::fs::read(path)
        .map_err(|e| PipelineError::Persistence(format!("failed to read index: {}", e)))?;
    let mut reader = bytes.as_slice();

    let mut magic = [0u8; 4];
    let mut dim_buf = [0u8; 4];
    let mut count_buf = [0u8; 8];
    let header_err = |_| PipelineError::Persistence("index file truncated".to_string());
    reader.read_exact(&mut magic).map_err(header_err)?;
    if magic != INDEX_MAGIC {
        return Err(PipelineError::Persistence(
            "index file has wrong magic".to_string(),
        ));
    }
    reader.read_exact(&mut dim_buf).map_err(header_err)?;
    reader.read_exact(&mut count_buf).map_err(header_err)?;

    let dim = u32::from_le_bytes(dim_buf) as usize;
    let count = u64::from_le_bytes(count_buf) as usize;
    let expected = count
        .checked_mul(dim)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| {
            PipelineError::Persistence(format!(
                "index header implausible: {} vectors of dimension {}",
                count, dim
            ))
        })?;
    if reader.len() != expected {
        return Err(PipelineError::Persistence(format!(
            "index payload is {} bytes, expected {} ({} x {} f32)",
            reader.len(),
            expected,
            count,
            dim
        )));
    }

    let mut vectors = Vec::with_capacity(count);
    for chunk in reader.chunks_exact(dim * 4) {
        let vector: Vec<f32> = chunk
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        vectors.push(vector);
    }
    Ok((dim, vectors))
}

/// Create a fresh directory under `base_path`, preferring `name` and
/// falling back to suffixed candidates. `create_dir` doubles as the
/// existence check, so a concurrently created directory of the same name
/// moves us to the next candidate instead of overwriting.
fn claim_store_dir(base_path: &Path, name: &str) -> Result<StoreDirectory> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = if attempt == 0 {
            name.to_string()
        } else {
            format!("{}_{}", name, random_suffix())
        };
        let path = base_path.join(&candidate);
        match std::fs::create_dir(&path) {
            Ok(()) => {
                if attempt > 0 {
                    info!(requested = name, chosen = %candidate, "store name collision resolved");
                }
                return Ok(StoreDirectory {
                    name: candidate,
                    path,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(PipelineError::Persistence(format!(
                    "failed to create store directory {}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
    Err(PipelineError::Persistence(format!(
        "no free store name for '{}' under {} after {} attempts",
        name,
        base_path.display(),
        MAX_NAME_ATTEMPTS
    )))
}

fn random_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Timestamped run summary persisted as the store's `run.log`.
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, message: impl AsRef<str>) {
        self.lines.push(format!(
            "{} {}",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message.as_ref()
        ));
    }

    fn contents(&self) -> String {
        let mut out = self.lines.join("\n");
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str, key: &str, value: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert(key.to_string(), value.into());
        Document::new(text, metadata)
    }

    fn sample_store() -> VectorStore {
        let documents = vec![
            doc("first", "file_path", "a.txt"),
            doc("second", "file_path", "b.txt"),
            doc("third", "file_path", "c.txt"),
        ];
        let embeddings = vec![
            vec![0.0, 0.0, 1.0],
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 0.0],
        ];
        VectorStore::build(documents, embeddings).unwrap()
    }

    #[test]
    fn build_assigns_sequential_ids() {
        let store = sample_store();
        assert_eq!(store.len(), 3);
        assert_eq!(store.dim(), 3);
        let ids: Vec<u64> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(store.records()[1].text, "second");
    }

    #[test]
    fn build_rejects_count_mismatch() {
        let err = VectorStore::build(vec![doc("x", "k", "v")], vec![]).unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }

    #[test]
    fn build_rejects_empty_input() {
        let err = VectorStore::build(vec![], vec![]).unwrap_err();
        assert!(err.to_string().contains("zero embeddings"));
    }

    #[test]
    fn build_rejects_ragged_dimensions() {
        let documents = vec![doc("a", "k", "v"), doc("b", "k", "v")];
        let embeddings = vec![vec![1.0, 2.0], vec![1.0]];
        let err = VectorStore::build(documents, embeddings).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn reserved_metadata_keys_are_dropped() {
        let mut metadata = Metadata::new();
        metadata.insert("id".to_string(), "bogus".into());
        metadata.insert("lang".to_string(), "en".into());
        let store = VectorStore::build(
            vec![Document::new("t", metadata)],
            vec![vec![1.0]],
        )
        .unwrap();
        assert!(!store.records()[0].metadata.contains_key("id"));
        assert!(store.records()[0].metadata.contains_key("lang"));
    }

    #[test]
    fn search_returns_nearest_first() {
        let store = sample_store();
        let hits = store.search(&[0.9, 0.1, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, 2);
        assert!(hits[0].1 < hits[1].1);
    }

    #[test]
    fn search_with_wrong_dimension_is_empty() {
        let store = sample_store();
        assert!(store.search(&[1.0], 5).is_empty());
    }

    #[test]
    fn persist_and_open_round_trips() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let mut log = RunLog::new();
        log.record("3 documents embedded");

        let dir = store.persist(base.path(), "docs", &log).unwrap();
        assert_eq!(dir.name, "docs");
        assert!(dir.path.join(INDEX_FILE).exists());
        assert!(dir.path.join(METADATA_FILE).exists());
        let log_text = std::fs::read_to_string(dir.path.join(RUN_LOG_FILE)).unwrap();
        assert!(log_text.contains("3 documents embedded"));

        let reopened = VectorStore::open(&dir.path).unwrap();
        assert_eq!(reopened.len(), store.len());
        assert_eq!(reopened.dim(), store.dim());
        for record in store.records() {
            assert_eq!(
                reopened.vector(record.id).unwrap(),
                store.vector(record.id).unwrap()
            );
            assert_eq!(reopened.records()[record.id as usize].text, record.text);
            assert_eq!(
                reopened.records()[record.id as usize].metadata,
                record.metadata
            );
        }
    }

    #[test]
    fn collision_appends_suffix_and_keeps_both_stores() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let log = RunLog::new();

        let first = store.persist(base.path(), "docs", &log).unwrap();
        let second = store.persist(base.path(), "docs", &log).unwrap();
        assert_eq!(first.name, "docs");
        assert_ne!(second.name, first.name);
        assert!(second.name.starts_with("docs_"));

        assert!(VectorStore::open(&first.path).is_ok());
        assert!(VectorStore::open(&second.path).is_ok());
    }

    #[test]
    fn open_rejects_corrupt_index() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let dir = store.persist(base.path(), "docs", &RunLog::new()).unwrap();

        std::fs::write(dir.path.join(INDEX_FILE), b"XXXXgarbage").unwrap();
        let err = VectorStore::open(&dir.path).unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn open_rejects_overflowing_index_header() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let dir = store.persist(base.path(), "docs", &RunLog::new()).unwrap();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"VFI1");
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());
        std::fs::write(dir.path.join(INDEX_FILE), &bytes).unwrap();
        let err = VectorStore::open(&dir.path).unwrap_err();
        assert!(err.to_string().contains("implausible"));
    }

    #[test]
    fn open_rejects_metadata_index_mismatch() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let dir = store.persist(base.path(), "docs", &RunLog::new()).unwrap();

        std::fs::write(dir.path.join(METADATA_FILE), "[]").unwrap();
        let err = VectorStore::open(&dir.path).unwrap_err();
        assert!(err.to_string().contains("records"));
    }

    #[test]
    fn metadata_json_is_flattened_and_positional() {
        let base = tempfile::tempdir().unwrap();
        let store = sample_store();
        let dir = store.persist(base.path(), "docs", &RunLog::new()).unwrap();

        let raw = std::fs::read_to_string(dir.path.join(METADATA_FILE)).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let array = parsed.as_array().unwrap();
        assert_eq!(array.len(), 3);
        assert_eq!(array[0]["id"], 0);
        assert_eq!(array[0]["file_path"], "a.txt");
        assert_eq!(array[2]["text"], "third");
    }
}
