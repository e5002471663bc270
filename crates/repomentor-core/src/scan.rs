//! Discovering and decoding source files in a repository snapshot.
//!
//! Traversal prunes dependency, build and VCS directories before descending into
//! them; unreadable files are kept but contribute no text.

use std::path::{Component, Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

/// Directory names never descended into.
pub const IGNORED_DIRS: &[&str] = &[
    "venv",
    ".venv",
    "env",
    ".env",
    ".git",
    "__pycache__",
    "node_modules",
    "site-packages",
    "build",
    "dist",
];

/// Extensions (without the dot) admitted for indexing.
pub const ALLOWED_EXTENSIONS: &[&str] = &["py", "md", "txt", "html", "js", "css", "java", "cpp"];

/// A file admitted by the scanner, with its decoded text.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the scan root, always `/`-separated.
    pub relative_path: String,
    pub extension: String,
    /// Empty when the file could not be read.
    pub text: String,
}

/// Lazily walks `root`, yielding every admitted file in traversal order.
/// Each call starts a fresh traversal.
pub fn scan_repo(root: &Path) -> impl Iterator<Item = SourceFile> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_pruned(e))
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::debug!("skipping unwalkable entry: {e}");
                None
            }
        })
        .filter(|e| e.file_type().is_file())
        .filter_map(move |e| admit(root, e.path()))
}

fn is_pruned(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    entry
        .file_name()
        .to_str()
        .map(|s| IGNORED_DIRS.contains(&s) || s.starts_with('.'))
        .unwrap_or(false)
}

fn admit(root: &Path, path: &Path) -> Option<SourceFile> {
    let relative = path.strip_prefix(root).ok()?;
    if !is_allowed(relative) {
        tracing::trace!(path = %relative.display(), "not admitted");
        return None;
    }
    let extension = relative.extension()?.to_str()?.to_string();
    let text = match read_source(path, &extension) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!("treating as empty: {e}");
            String::new()
        }
    };
    Some(SourceFile {
        path: path.to_path_buf(),
        relative_path: slash_path(relative),
        extension,
        text,
    })
}

/// Extension is allow-listed and no component of `relative` is hidden.
pub fn is_allowed(relative: &Path) -> bool {
    let allowed_ext = relative
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ALLOWED_EXTENSIONS.contains(&e));
    allowed_ext
        && !relative.components().any(|c| match c {
            Component::Normal(part) => part.to_str().is_some_and(|s| s.starts_with('.')),
            _ => false,
        })
}

/// Reads a file dropping invalid UTF-8; HTML is reduced to its text nodes.
pub fn read_source(path: &Path, extension: &str) -> Result<String, ScanError> {
    let bytes = std::fs::read(path).map_err(|e| ScanError::Read(path.to_path_buf(), e))?;
    let text = decode_permissive(&bytes);
    if extension == "html" {
        return Ok(html_to_text(&text));
    }
    Ok(text)
}

fn decode_permissive(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        out.push_str(chunk.valid());
    }
    out
}

/// Text nodes of an HTML document joined by newlines.
pub fn html_to_text(html: &str) -> String {
    let document = scraper::Html::parse_document(html);
    let parts: Vec<&str> = document.root_element().text().collect();
    parts.join("\n")
}

fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
}
