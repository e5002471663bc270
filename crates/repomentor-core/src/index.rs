//! Index pipeline: scan → chunk → embed → store. Rebuilds the on-disk index from scratch.

use std::path::Path;

use crate::chunks::{chunk_source, ChunkerConfig};
use crate::provider::{EmbedMode, Embedder, LlmError};
use crate::scan::scan_repo;
use crate::store::{ChunkMetadata, IndexedChunk, StoreError, VectorStore};

/// Default number of chunks embedded and written per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    pub chunker: ChunkerConfig,
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Summary of an ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files_scanned: usize,
    /// Files that contributed at least one chunk.
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub batches: usize,
}

/// Chunks waiting for their embeddings.
struct PendingBatch {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<ChunkMetadata>,
}

impl PendingBatch {
    fn with_capacity(n: usize) -> Self {
        Self {
            ids: Vec::with_capacity(n),
            documents: Vec::with_capacity(n),
            metadatas: Vec::with_capacity(n),
        }
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Runs the full pipeline into a fresh index at `index_dir`.
///
/// Any previous index there is deleted first. On an embedding failure the batches
/// already written stay on disk.
pub async fn ingest<E: Embedder>(
    repo_root: &Path,
    index_dir: &Path,
    embedder: &E,
    config: &IngestConfig,
) -> Result<IngestReport, IndexError> {
    if !repo_root.is_dir() {
        return Err(IndexError::NotADirectory(repo_root.to_path_buf()));
    }
    let mut store = VectorStore::create(index_dir)?;
    let batch_size = config.batch_size.max(1);
    let mut report = IngestReport::default();
    let mut pending = PendingBatch::with_capacity(batch_size);

    tracing::info!(repo = %repo_root.display(), "ingestion started");
    for file in scan_repo(repo_root) {
        report.files_scanned += 1;
        let chunks = chunk_source(&file.text, &file.extension, &config.chunker);
        if chunks.is_empty() {
            continue;
        }
        report.files_indexed += 1;
        tracing::debug!(file = %file.relative_path, chunks = chunks.len());

        for chunk in chunks {
            pending.ids.push(format!("id_{}", report.chunks_indexed));
            pending.metadatas.push(ChunkMetadata {
                file_path: file.relative_path.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                kind: chunk.kind,
                name: chunk.name.unwrap_or_default(),
            });
            pending.documents.push(chunk.content);
            report.chunks_indexed += 1;

            if pending.len() == batch_size {
                let full = std::mem::replace(&mut pending, PendingBatch::with_capacity(batch_size));
                write_batch(&mut store, embedder, full, &mut report).await?;
            }
        }
    }
    if pending.len() > 0 {
        write_batch(&mut store, embedder, pending, &mut report).await?;
    }

    if report.chunks_indexed == 0 {
        tracing::warn!(repo = %repo_root.display(), "no valid files found; index is empty");
    } else {
        tracing::info!(
            files = report.files_indexed,
            chunks = report.chunks_indexed,
            batches = report.batches,
            "ingestion complete"
        );
    }
    Ok(report)
}

async fn write_batch<E: Embedder>(
    store: &mut VectorStore,
    embedder: &E,
    batch: PendingBatch,
    report: &mut IngestReport,
) -> Result<(), IndexError> {
    let embeddings = embedder
        .embed_batch(&batch.documents, EmbedMode::Document)
        .await?;
    if embeddings.len() != batch.len() {
        return Err(LlmError::Mismatch {
            expected: batch.len(),
            actual: embeddings.len(),
        }
        .into());
    }
    let records = batch
        .ids
        .into_iter()
        .zip(batch.documents)
        .zip(batch.metadatas)
        .zip(embeddings)
        .map(|(((id, doc), meta), emb)| IndexedChunk::new(id, doc, meta, emb))
        .collect();
    store.add(records)?;
    report.batches += 1;
    tracing::info!(batch = report.batches, indexed = store.len(), "batch written");
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("not a directory: {0}")]
    NotADirectory(std::path::PathBuf),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("embedding error: {0}")]
    Embed(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::chunks::ChunkKind;
    use crate::provider::testing::{FailingEmbedder, HashEmbedder};

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(
            root.join("src/app.py"),
            "@route\ndef handler():\n    return 1\n\nclass Model:\n    pass\n",
        )
        .unwrap();
        let notes: String = (1..=120).map(|i| format!("note {i}\n")).collect();
        fs::write(root.join("NOTES.txt"), notes).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "module.exports = 1;\n").unwrap();
        fs::write(root.join("src/image.png"), [0u8, 1, 2]).unwrap();
        dir
    }

    fn snapshot(dir: &Path) -> Vec<(String, String, ChunkMetadata)> {
        VectorStore::open(dir)
            .unwrap()
            .iter()
            .map(|r| (r.id.clone(), r.document.clone(), r.metadata.clone()))
            .collect()
    }

    #[tokio::test]
    async fn ingest_indexes_admitted_files() {
        let repo = repo();
        let out = TempDir::new().unwrap();
        let db = out.path().join("db");
        let report = ingest(repo.path(), &db, &HashEmbedder::default(), &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(report.files_indexed, 2);
        assert_eq!(report.chunks_indexed, 5);

        let records = snapshot(&db);
        let ids: Vec<_> = records.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(ids, vec!["id_0", "id_1", "id_2", "id_3", "id_4"]);
        assert!(records.iter().all(|r| !r.2.file_path.contains("node_modules")));

        let handler = records.iter().find(|r| r.2.name == "handler").unwrap();
        assert_eq!(handler.2.file_path, "src/app.py");
        assert_eq!((handler.2.start_line, handler.2.end_line), (1, 3));
        assert_eq!(handler.2.kind, ChunkKind::CodeBlock);

        let windows: Vec<_> = records
            .iter()
            .filter(|r| r.2.file_path == "NOTES.txt")
            .map(|r| (r.2.start_line, r.2.end_line, r.2.name.as_str()))
            .collect();
        assert_eq!(windows, vec![(1, 50, ""), (51, 100, ""), (101, 120, "")]);
    }

    #[tokio::test]
    async fn reingest_replaces_rather_than_appends() {
        let repo = repo();
        let out = TempDir::new().unwrap();
        let db = out.path().join("db");
        let embedder = HashEmbedder::default();
        let config = IngestConfig::default();
        ingest(repo.path(), &db, &embedder, &config).await.unwrap();
        let first = snapshot(&db);
        ingest(repo.path(), &db, &embedder, &config).await.unwrap();
        assert_eq!(snapshot(&db), first);
    }

    #[tokio::test]
    async fn batch_size_does_not_change_contents() {
        let repo = repo();
        let out = TempDir::new().unwrap();
        let embedder = HashEmbedder::default();
        let whole = out.path().join("whole");
        let split = out.path().join("split");
        ingest(repo.path(), &whole, &embedder, &IngestConfig::default())
            .await
            .unwrap();
        let small = IngestConfig {
            batch_size: 2,
            ..IngestConfig::default()
        };
        let report = ingest(repo.path(), &split, &embedder, &small).await.unwrap();
        assert_eq!(report.batches, 3);
        assert_eq!(snapshot(&whole), snapshot(&split));
    }

    #[tokio::test]
    async fn empty_repository_yields_empty_index() {
        let repo = TempDir::new().unwrap();
        fs::write(repo.path().join("binary.bin"), [0u8; 4]).unwrap();
        let out = TempDir::new().unwrap();
        let embedder = HashEmbedder::default();
        let report = ingest(repo.path(), out.path(), &embedder, &IngestConfig::default())
            .await
            .unwrap();
        assert_eq!(report.chunks_indexed, 0);
        assert_eq!(report.batches, 0);
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(VectorStore::open(out.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_keeps_earlier_batches() {
        let repo = repo();
        let out = TempDir::new().unwrap();
        let config = IngestConfig {
            batch_size: 2,
            ..IngestConfig::default()
        };
        let err = ingest(repo.path(), out.path(), &FailingEmbedder::after(1), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Embed(_)));
        assert_eq!(VectorStore::open(out.path()).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_repository_is_an_error() {
        let out = TempDir::new().unwrap();
        let err = ingest(
            &out.path().join("absent"),
            &out.path().join("db"),
            &HashEmbedder::default(),
            &IngestConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, IndexError::NotADirectory(_)));
    }
}
