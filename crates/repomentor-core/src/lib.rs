//! All backend logic independent of how the app is run.
//!
//! A repository snapshot is scanned, chunked and embedded into a per-session index;
//! questions are answered from the chunks retrieved for them. RepoMentor stores
//! config and sessions in its own app data directory (see [app_data]).

pub mod acquire;
pub mod answer;
pub mod app_data;
pub mod chunks;
pub mod config;
pub mod eval;
pub mod index;
pub mod ollama;
pub mod provider;
pub mod retrieve;
pub mod scan;
pub mod session;
pub mod store;
pub mod syntax;

pub use acquire::{AcquireError, Source};
pub use answer::{compose_answer, compose_explanation, source_label, Answer};
pub use app_data::{app_data_dir, sessions_root};
pub use chunks::{chunk_source, Chunk, ChunkKind, ChunkerConfig, DEFAULT_WINDOW_LINES};
pub use config::{config_path, load_config, save_config, Config, ConfigError};
pub use index::{ingest, IndexError, IngestConfig, IngestReport};
pub use ollama::OllamaClient;
pub use provider::{EmbedMode, Embedder, Generator, LlmError};
pub use retrieve::{retrieve, retrieve_file, RetrievalResult, Retrieved};
pub use scan::{scan_repo, SourceFile};
pub use session::{Session, SessionError};
pub use store::{ChunkMetadata, VectorStore};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "repomentor-core ready"
}

