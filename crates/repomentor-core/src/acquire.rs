//! Materializing a repository snapshot on disk from an archive, a clone, or a local copy.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::{DirEntry, WalkDir};

use crate::scan::IGNORED_DIRS;

/// Largest archive accepted for extraction.
pub const MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;

/// Where a repository snapshot comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A `.zip` archive of the repository.
    Zip(PathBuf),
    /// A remote URL for `git clone --depth 1`.
    Git(String),
    /// A directory on this machine, copied as-is.
    Directory(PathBuf),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zip(p) => write!(f, "archive {}", p.display()),
            Self::Git(url) => write!(f, "git {url}"),
            Self::Directory(p) => write!(f, "directory {}", p.display()),
        }
    }
}

/// Populate `dest` (created if needed) from `source`.
pub fn acquire(source: &Source, dest: &Path) -> Result<(), AcquireError> {
    match source {
        Source::Zip(archive) => extract_zip(archive, dest),
        Source::Git(url) => git_clone(url, dest),
        Source::Directory(dir) => copy_dir(dir, dest),
    }
}

/// Extract a zip archive into `dest`. Entries escaping `dest` are skipped.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<(), AcquireError> {
    let size = fs::metadata(archive)
        .map_err(|e| AcquireError::Io(archive.to_path_buf(), e))?
        .len();
    if size > MAX_ARCHIVE_BYTES {
        return Err(AcquireError::TooLarge {
            size,
            limit: MAX_ARCHIVE_BYTES,
        });
    }
    let file = File::open(archive).map_err(|e| AcquireError::Io(archive.to_path_buf(), e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| AcquireError::Archive(e.to_string()))?;
    fs::create_dir_all(dest).map_err(|e| AcquireError::Io(dest.to_path_buf(), e))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| AcquireError::Archive(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let out = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&out).map_err(|e| AcquireError::Io(out.clone(), e))?;
            continue;
        }
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| AcquireError::Io(parent.to_path_buf(), e))?;
        }
        let mut target = File::create(&out).map_err(|e| AcquireError::Io(out.clone(), e))?;
        io::copy(&mut entry, &mut target).map_err(|e| AcquireError::Io(out.clone(), e))?;
    }
    tracing::info!(archive = %archive.display(), entries = zip.len(), "archive extracted");
    Ok(())
}

/// Shallow-clone `url` into `dest`.
pub fn git_clone(url: &str, dest: &Path) -> Result<(), AcquireError> {
    let output = Command::new("git")
        .args(["clone", "--depth", "1"])
        .arg(url)
        .arg(dest)
        .output()
        .map_err(AcquireError::GitSpawn)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AcquireError::Clone(stderr.trim().to_string()));
    }
    tracing::info!(%url, "repository cloned");
    Ok(())
}

/// Recursively copy `src` into `dest`. Symlinks are not followed.
///
/// Only files are copied, so empty directories are not reproduced. Directories the
/// scanner would prune are left behind, and so is `dest` itself when it lies inside `src`.
pub fn copy_dir(src: &Path, dest: &Path) -> Result<(), AcquireError> {
    if !src.is_dir() {
        return Err(AcquireError::NotADirectory(src.to_path_buf()));
    }
    fs::create_dir_all(dest).map_err(|e| AcquireError::Io(dest.to_path_buf(), e))?;
    let src = src
        .canonicalize()
        .map_err(|e| AcquireError::Io(src.to_path_buf(), e))?;
    let own_output = dest
        .canonicalize()
        .map_err(|e| AcquireError::Io(dest.to_path_buf(), e))?;

    let walker = WalkDir::new(&src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !skip_on_copy(e, &own_output));
    for entry in walker {
        let entry = entry.map_err(|e| AcquireError::Walk(e.to_string()))?;
        let Ok(relative) = entry.path().strip_prefix(&src) else {
            continue;
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let out = dest.join(relative);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|e| AcquireError::Io(parent.to_path_buf(), e))?;
        }
        fs::copy(entry.path(), &out).map_err(|e| AcquireError::Io(out.clone(), e))?;
    }
    Ok(())
}

fn skip_on_copy(entry: &DirEntry, own_output: &Path) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    entry.path() == own_output
        || entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("archive is {size} bytes; the limit is {limit}")]
    TooLarge { size: u64, limit: u64 },
    #[error("bad archive: {0}")]
    Archive(String),
    #[error("failed to execute 'git clone'. Is git installed? {0}")]
    GitSpawn(io::Error),
    #[error("Git clone failed: {0}")]
    Clone(String),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("io error at {0}: {1}")]
    Io(PathBuf, io::Error),
}
