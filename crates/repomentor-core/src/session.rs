//! A session owns one repository snapshot and one index, under `<root>/<id>/`.
//!
//! Ingestion tears down the previous snapshot and index first. The `ready` marker is
//! written last, so a session whose ingestion failed is never queried.

use std::fs;
use std::path::{Path, PathBuf};

use crate::acquire::{acquire, AcquireError, Source};
use crate::answer::{compose_answer, compose_explanation, Answer};
use crate::app_data;
use crate::index::{ingest, IndexError, IngestConfig, IngestReport};
use crate::provider::{Embedder, Generator};
use crate::retrieve::{indexed_files, retrieve, retrieve_file};
use crate::store::{StoreError, VectorStore};

pub const NOT_READY: &str = "Repository is not ready. Ingest a repository first.";

const READY_MARKER: &str = "ready";

#[derive(Debug)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

impl Session {
    /// A new session with a fresh id under the app data sessions root.
    pub fn create() -> Result<Self, SessionError> {
        let root = app_data::sessions_root().ok_or(SessionError::NoDataDir)?;
        Ok(Self::create_in(&root))
    }

    /// A new session with a fresh id under `root`. Nothing is written until ingestion.
    pub fn create_in(root: &Path) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            dir: root.join(&id),
            id,
        }
    }

    /// Reattach to an existing session by id.
    pub fn open(id: &str) -> Result<Self, SessionError> {
        let root = app_data::sessions_root().ok_or(SessionError::NoDataDir)?;
        Self::open_in(&root, id)
    }

    pub fn open_in(root: &Path, id: &str) -> Result<Self, SessionError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(SessionError::BadId(id.to_string()));
        }
        let dir = root.join(id);
        if !dir.is_dir() {
            return Err(SessionError::Unknown(id.to_string()));
        }
        Ok(Self {
            id: id.to_string(),
            dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.dir.join("repo")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.dir.join("db")
    }

    /// True once an ingestion has completed successfully.
    pub fn is_ready(&self) -> bool {
        self.dir.join(READY_MARKER).is_file()
    }

    /// Replace this session's snapshot and index with `source`.
    pub async fn prepare<E: Embedder>(
        &mut self,
        source: &Source,
        embedder: &E,
        config: &IngestConfig,
    ) -> Result<IngestReport, SessionError> {
        self.teardown()?;
        fs::create_dir_all(self.repo_dir()).map_err(|e| SessionError::Io(self.repo_dir(), e))?;
        tracing::info!(session = %self.id, %source, "preparing repository");

        acquire(source, &self.repo_dir())?;
        let report = ingest(&self.repo_dir(), &self.index_dir(), embedder, config).await?;

        let marker = self.dir.join(READY_MARKER);
        fs::write(&marker, b"").map_err(|e| SessionError::Io(marker, e))?;
        Ok(report)
    }

    /// Answer a question about the ingested repository. Failures come back as text.
    pub async fn ask<E: Embedder, G: Generator>(
        &self,
        question: &str,
        embedder: &E,
        generator: &G,
        top_k: usize,
    ) -> Answer {
        let store = match self.store() {
            Ok(store) => store,
            Err(text) => return Answer::bare(text),
        };
        match retrieve(question, &store, embedder, top_k).await {
            Ok(result) => compose_answer(question, result, generator).await,
            Err(e) => {
                tracing::warn!(session = %self.id, "retrieval failed: {e}");
                Answer::bare(format!("Error generating answer: {e}"))
            }
        }
    }

    /// Explain one indexed file. Failures come back as text.
    pub async fn explain<G: Generator>(&self, file_path: &str, generator: &G) -> String {
        match self.store() {
            Ok(store) => compose_explanation(&retrieve_file(file_path, &store), generator).await,
            Err(text) => text,
        }
    }

    /// Files that can be explained.
    pub fn files(&self) -> Result<Vec<String>, SessionError> {
        if !self.is_ready() {
            return Err(SessionError::NotReady);
        }
        Ok(indexed_files(&VectorStore::open(&self.index_dir())?))
    }

    /// Delete the snapshot, index and marker. Safe to call repeatedly.
    pub fn teardown(&self) -> Result<(), SessionError> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| SessionError::Io(self.dir.clone(), e))?;
            tracing::info!(session = %self.id, "session torn down");
        }
        Ok(())
    }

    fn store(&self) -> Result<VectorStore, String> {
        if !self.is_ready() {
            return Err(NOT_READY.to_string());
        }
        VectorStore::open(&self.index_dir()).map_err(|e| format!("Error: {e}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("invalid session id: {0:?}")]
    BadId(String),
    #[error("no such session: {0}")]
    Unknown(String),
    #[error("repository is not ready; ingest a repository first")]
    NotReady,
    #[error(transparent)]
    Acquire(#[from] AcquireError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
}
