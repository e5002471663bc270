//! Question-time lookups against a built index.

use crate::provider::{EmbedMode, Embedder, LlmError};
use crate::store::{ChunkMetadata, VectorStore};

/// Default number of chunks retrieved per question.
pub const DEFAULT_TOP_K: usize = 7;

/// A retrieved chunk with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub content: String,
    pub metadata: ChunkMetadata,
    /// Cosine similarity to the question; `None` for file lookups.
    pub score: Option<f32>,
}

/// Ordered retrieval output: by relevance for questions, by line for files.
pub type RetrievalResult = Vec<Retrieved>;

/// The `k` chunks nearest to `question`, most relevant first.
pub async fn retrieve<E: Embedder>(
    question: &str,
    store: &VectorStore,
    embedder: &E,
    k: usize,
) -> Result<RetrievalResult, LlmError> {
    if store.is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    let query = embedder
        .embed_batch(&[question.to_string()], EmbedMode::Query)
        .await?;
    let Some(vector) = query.into_iter().next() else {
        return Err(LlmError::Mismatch {
            expected: 1,
            actual: 0,
        });
    };
    Ok(store
        .query(&vector, k)
        .into_iter()
        .map(|m| Retrieved {
            content: m.document,
            metadata: m.metadata,
            score: Some(m.score),
        })
        .collect())
}

/// All chunks of one file, ascending by start line. Empty if the file was never indexed.
pub fn retrieve_file(file_path: &str, store: &VectorStore) -> RetrievalResult {
    let mut chunks: Vec<Retrieved> = store
        .get_by_file(file_path)
        .into_iter()
        .map(|ic| Retrieved {
            content: ic.document.clone(),
            metadata: ic.metadata.clone(),
            score: None,
        })
        .collect();
    chunks.sort_by_key(|r| r.metadata.start_line);
    chunks
}

/// Distinct indexed file paths, sorted.
pub fn indexed_files(store: &VectorStore) -> Vec<String> {
    let mut files: Vec<String> = store.iter().map(|ic| ic.metadata.file_path.clone()).collect();
    files.sort();
    files.dedup();
    files
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::chunks::ChunkKind;
    use crate::provider::testing::{FailingEmbedder, HashEmbedder};
    use crate::store::IndexedChunk;

    fn record(id: usize, file: &str, start: usize, doc: &str) -> IndexedChunk {
        IndexedChunk::new(
            format!("id_{id}"),
            doc.to_string(),
            ChunkMetadata {
                file_path: file.to_string(),
                start_line: start,
                end_line: start + 1,
                kind: ChunkKind::Text,
                name: String::new(),
            },
            HashEmbedder::vector(doc),
        )
    }

    fn store(dir: &TempDir) -> VectorStore {
        let mut store = VectorStore::create(dir.path()).unwrap();
        store
            .add(vec![
                record(0, "ingest.py", 40, "batch insert into chroma collection"),
                record(1, "config.py", 1, "EMBED_MODEL text-embedding-004 embedding model"),
                record(2, "ingest.py", 1, "import os shutil"),
                record(3, "utils.py", 1, "read file utf-8 decode"),
                record(4, "ingest.py", 20, "walk repo ignored dirs"),
            ])
            .unwrap();
        store
    }

    #[tokio::test]
    async fn retrieve_ranks_and_truncates() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let hits = retrieve("which embedding model", &store, &HashEmbedder::default(), 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.file_path, "config.py");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn empty_index_retrieves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = VectorStore::create(dir.path()).unwrap();
        let embedder = HashEmbedder::default();
        let hits = retrieve("anything", &store, &embedder, 7).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedding_failure_is_returned() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(retrieve("q", &store, &FailingEmbedder::after(0), 3)
            .await
            .is_err());
    }

    #[test]
    fn file_chunks_come_back_in_line_order() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let starts: Vec<_> = retrieve_file("ingest.py", &store)
            .iter()
            .map(|r| r.metadata.start_line)
            .collect();
        assert_eq!(starts, vec![1, 20, 40]);
    }

    #[test]
    fn unknown_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(retrieve_file("nowhere.py", &store(&dir)).is_empty());
    }

    #[test]
    fn indexed_files_are_distinct() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            indexed_files(&store(&dir)),
            vec!["config.py", "ingest.py", "utils.py"]
        );
    }
}
