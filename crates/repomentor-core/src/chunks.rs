//! Splits a file's text into chunks for embedding and search.
//! Prefers declaration units (functions, classes) where a parser exists; falls back to
//! fixed-size line windows.

use serde::{Deserialize, Serialize};

use crate::syntax::{parser_for_extension, Declaration, SourceParser};

/// Default number of lines per window chunk.
pub const DEFAULT_WINDOW_LINES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Text,
    CodeBlock,
}

impl ChunkKind {
    /// Name used in stored metadata and context headers.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::CodeBlock => "code_block",
        }
    }
}

/// A contiguous span of a file. Lines are 1-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    /// Declared identifier; only set for [ChunkKind::CodeBlock].
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub window_lines: usize,
    /// Emit chunks for declarations nested inside other declarations.
    pub nested_chunks: bool,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window_lines: DEFAULT_WINDOW_LINES,
            nested_chunks: true,
        }
    }
}

/// Chunk one file. `extension` is the file extension without the dot.
pub fn chunk_source(text: &str, extension: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    match parser_for_extension(extension) {
        Some(parser) => chunk_declarations(text, parser.as_ref(), config),
        None => chunk_windows(text, config.window_lines),
    }
}

/// Declaration chunks, or windows when parsing fails or finds nothing to chunk.
pub fn chunk_declarations(
    text: &str,
    parser: &dyn SourceParser,
    config: &ChunkerConfig,
) -> Vec<Chunk> {
    let decls = match parser.parse(text) {
        Ok(decls) => decls,
        Err(e) => {
            tracing::debug!("falling back to windows: {e}");
            return chunk_windows(text, config.window_lines);
        }
    };
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks: Vec<Chunk> = decls
        .iter()
        .filter(|d| config.nested_chunks || d.depth == 0)
        .filter_map(|d| declaration_chunk(d, &lines))
        .collect();
    if chunks.is_empty() {
        return chunk_windows(text, config.window_lines);
    }
    chunks.sort_by_key(|c| c.start_line);
    chunks
}

fn declaration_chunk(decl: &Declaration, lines: &[&str]) -> Option<Chunk> {
    let end = decl.end_line?.min(lines.len());
    let start = decl.span_start().max(1);
    if start > end {
        return None;
    }
    Some(Chunk {
        content: lines[start - 1..end].join("\n"),
        start_line: start,
        end_line: end,
        kind: ChunkKind::CodeBlock,
        name: Some(decl.name.clone()),
    })
}

/// Consecutive windows of `window_lines` lines; the last window may be shorter.
pub fn chunk_windows(text: &str, window_lines: usize) -> Vec<Chunk> {
    let size = window_lines.max(1);
    let lines: Vec<&str> = text.lines().collect();
    lines
        .chunks(size)
        .enumerate()
        .map(|(i, window)| Chunk {
            content: window.join("\n"),
            start_line: i * size + 1,
            end_line: i * size + window.len(),
            kind: ChunkKind::Text,
            name: None,
        })
        .collect()
}
