//! Disk-backed vector store for chunk embeddings: one `code_chunks` collection per
//! index directory, appended as JSON lines and loaded whole on open.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunks::ChunkKind;

/// Name of the single collection kept in every index directory.
pub const COLLECTION: &str = "code_chunks";

/// Per-chunk provenance. This is the wire shape shared by ingestion and retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// Empty when the chunk has no declared name.
    pub name: String,
}

/// One stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    pub document: String,
    pub metadata: ChunkMetadata,
    /// Normalized embedding vector (unit length for cosine similarity via dot product).
    embedding: Vec<f32>,
}

impl IndexedChunk {
    /// Build a record. Embedding is normalized before storage.
    pub fn new(id: String, document: String, metadata: ChunkMetadata, embedding: Vec<f32>) -> Self {
        Self {
            id,
            document,
            metadata,
            embedding: normalize(&embedding),
        }
    }
}

/// A record returned by a similarity query.
#[derive(Debug, Clone)]
pub struct Match {
    pub document: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

#[derive(Debug)]
pub struct VectorStore {
    path: PathBuf,
    items: Vec<IndexedChunk>,
}

impl VectorStore {
    /// Delete whatever lives at `dir` and start an empty collection there.
    pub fn create(dir: &Path) -> Result<Self, StoreError> {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| StoreError::Io(dir.to_path_buf(), e))?;
        }
        fs::create_dir_all(dir).map_err(|e| StoreError::Io(dir.to_path_buf(), e))?;
        let path = collection_path(dir);
        File::create(&path).map_err(|e| StoreError::Io(path.clone(), e))?;
        Ok(Self {
            path,
            items: Vec::new(),
        })
    }

    /// Load the collection written by an earlier [VectorStore::create].
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let path = collection_path(dir);
        if !path.is_file() {
            return Err(StoreError::Missing(dir.to_path_buf()));
        }
        let file = File::open(&path).map_err(|e| StoreError::Io(path.clone(), e))?;
        let mut items = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| StoreError::Io(path.clone(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let item = serde_json::from_str(&line).map_err(|e| StoreError::Corrupt {
                line: n + 1,
                source: e,
            })?;
            items.push(item);
        }
        Ok(Self { path, items })
    }

    /// Append a batch and flush it to disk before returning.
    pub fn add(&mut self, batch: Vec<IndexedChunk>) -> Result<(), StoreError> {
        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Io(self.path.clone(), e))?;
        let mut out = BufWriter::new(file);
        for item in &batch {
            serde_json::to_writer(&mut out, item).map_err(StoreError::Encode)?;
            out.write_all(b"\n")
                .map_err(|e| StoreError::Io(self.path.clone(), e))?;
        }
        out.flush().map_err(|e| StoreError::Io(self.path.clone(), e))?;
        self.items.extend(batch);
        Ok(())
    }

    /// Up to `k` records most similar to the query embedding, best first.
    pub fn query(&self, query_embedding: &[f32], k: usize) -> Vec<Match> {
        if self.items.is_empty() || query_embedding.is_empty() || k == 0 {
            return Vec::new();
        }
        let q_norm = normalize(query_embedding);
        let mut scored: Vec<(&IndexedChunk, f32)> = self
            .items
            .iter()
            .map(|ic| (ic, dot(&q_norm, &ic.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(ic, score)| Match {
                document: ic.document.clone(),
                metadata: ic.metadata.clone(),
                score,
            })
            .collect()
    }

    /// Every record whose `file_path` equals `file_path`, in storage order.
    pub fn get_by_file(&self, file_path: &str) -> Vec<&IndexedChunk> {
        self.items
            .iter()
            .filter(|ic| ic.metadata.file_path == file_path)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedChunk> {
        self.items.iter()
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn collection_path(dir: &Path) -> PathBuf {
    dir.join(format!("{COLLECTION}.jsonl"))
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no index at {0}")]
    Missing(PathBuf),
    #[error("io error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("corrupt record on line {line}: {source}")]
    Corrupt {
        line: usize,
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(serde_json::Error),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn meta(file: &str, start: usize, name: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_path: file.into(),
            start_line: start,
            end_line: start + 4,
            kind: if name.is_empty() {
                ChunkKind::Text
            } else {
                ChunkKind::CodeBlock
            },
            name: name.into(),
        }
    }

    fn record(id: usize, file: &str, start: usize, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk::new(
            format!("id_{id}"),
            format!("doc {id}"),
            meta(file, start, ""),
            embedding,
        )
    }

    #[test]
    fn metadata_wire_shape() {
        let json = serde_json::to_value(meta("src/a.py", 3, "foo")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "file_path": "src/a.py",
                "start_line": 3,
                "end_line": 7,
                "type": "code_block",
                "name": "foo"
            })
        );
    }

    #[test]
    fn records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db");
        let mut store = VectorStore::create(&db).unwrap();
        store.add(vec![record(0, "a.py", 1, vec![1.0, 0.0])]).unwrap();
        store.add(vec![record(1, "b.md", 1, vec![0.0, 1.0])]).unwrap();

        let reopened = VectorStore::open(&db).unwrap();
        assert_eq!(reopened.len(), 2);
        let ids: Vec<_> = reopened.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["id_0", "id_1"]);
        assert_eq!(reopened.get_by_file("b.md")[0].metadata, meta("b.md", 1, ""));
    }

    #[test]
    fn create_discards_previous_collection() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::create(dir.path()).unwrap();
        store.add(vec![record(0, "a.py", 1, vec![1.0])]).unwrap();
        fs::write(dir.path().join("stray"), "x").unwrap();

        let store = VectorStore::create(dir.path()).unwrap();
        assert!(store.is_empty());
        assert!(VectorStore::open(dir.path()).unwrap().is_empty());
        assert!(!dir.path().join("stray").exists());
    }

    #[test]
    fn open_without_index_is_missing() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            VectorStore::open(&dir.path().join("nope")),
            Err(StoreError::Missing(_))
        ));
    }

    #[test]
    fn query_ranks_by_similarity() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::create(dir.path()).unwrap();
        store
            .add(vec![
                record(0, "a.py", 1, vec![1.0, 0.0]),
                record(1, "b.py", 1, vec![0.7, 0.7]),
                record(2, "c.py", 1, vec![0.0, 1.0]),
            ])
            .unwrap();
        let hits = store.query(&[0.0, 2.0], 2);
        let files: Vec<_> = hits.iter().map(|h| h.metadata.file_path.as_str()).collect();
        assert_eq!(files, vec!["c.py", "b.py"]);
        assert!(hits[0].score > hits[1].score);
        assert!(store.query(&[], 3).is_empty());
    }

    #[test]
    fn get_by_file_filters_exactly() {
        let dir = TempDir::new().unwrap();
        let mut store = VectorStore::create(dir.path()).unwrap();
        store
            .add(vec![
                record(0, "src/a.py", 10, vec![1.0]),
                record(1, "src/a.pyx", 1, vec![1.0]),
                record(2, "src/a.py", 1, vec![1.0]),
            ])
            .unwrap();
        assert_eq!(store.get_by_file("src/a.py").len(), 2);
        assert!(store.get_by_file("missing.py").is_empty());
    }
}
