//! File enumeration: turns a root path into the batch of files to upload.
//!
//! Traversal is depth-first with the entries of every directory sorted by file name,
//! so one filesystem snapshot always yields the same order.
//!
//! Policy for awkward entries:
//! - symlinks are not followed (below the root) and are not regular files, so they are skipped;
//! - unreadable entries below the root are logged, recorded in [`Batch::skipped`] and skipped;
//! - a missing or unreadable root is fatal;
//! - excluded directories (a local container living under the root) are pruned with
//!   everything below them.

use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::EnumerationError;

/// A regular file found under the root, with the object key it is uploaded to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePath {
    pub local: PathBuf,
    pub key: String,
}

/// An entry the walk could not read.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntry {
    pub path: Option<PathBuf>,
    pub reason: String,
}

/// Snapshot of the files discovered by one enumeration pass.
#[derive(Debug, Default, Clone)]
pub struct Batch {
    pub files: Vec<FilePath>,
    pub skipped: Vec<SkippedEntry>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.key.as_str()).collect()
    }
}

/// Walk `root` and collect every regular file below it.
///
/// Keys are the root-relative paths joined with `/`, prefixed with `key_prefix` when given.
/// When `root` is itself a file, the batch holds that single file keyed by its file name.
pub fn enumerate(root: &Path, key_prefix: Option<&str>) -> Result<Batch, EnumerationError> {
    enumerate_excluding(root, key_prefix, &[])
}

/// Like [`enumerate`], but never descends into any directory of `exclude`.
///
/// Excluded paths are matched after canonicalization, so `./out` and `/abs/root/out`
/// name the same directory. Paths that do not exist or lie outside the root are ignored.
pub fn enumerate_excluding(
    root: &Path,
    key_prefix: Option<&str>,
    exclude: &[PathBuf],
) -> Result<Batch, EnumerationError> {
    info!(root = %root.display(), "Enumerating files");

    let metadata = std::fs::metadata(root).map_err(|source| EnumerationError::Root {
        root: root.to_path_buf(),
        source,
    })?;

    if metadata.is_file() {
        let name = root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(Batch {
            files: vec![FilePath {
                local: root.to_path_buf(),
                key: with_prefix(key_prefix, name),
            }],
            skipped: Vec::new(),
        });
    }

    // Surface an unreadable root as a root error rather than a walk error.
    std::fs::read_dir(root).map_err(|source| EnumerationError::Root {
        root: root.to_path_buf(),
        source,
    })?;

    let excluded = excluded_dirs(root, exclude);
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let pruned = entry.depth() > 0
                && entry.file_type().is_dir()
                && excluded.iter().any(|dir| dir == entry.path());
            if pruned {
                debug!(path = %entry.path().display(), "Skipping excluded directory");
            }
            !pruned
        });

    let mut batch = Batch::default();
    for entry in walker {
        match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                if file_type.is_file() {
                    let key = with_prefix(key_prefix, relative_key(root, entry.path()));
                    batch.files.push(FilePath {
                        local: entry.into_path(),
                        key,
                    });
                } else if file_type.is_symlink() {
                    debug!(path = %entry.path().display(), "Skipping symlink");
                }
            }
            Err(err) if err.depth() == 0 => {
                return Err(EnumerationError::Walk {
                    root: root.to_path_buf(),
                    source: err,
                });
            }
            Err(err) => {
                warn!(
                    path = ?err.path(),
                    error = %err,
                    "Skipping unreadable entry"
                );
                batch.skipped.push(SkippedEntry {
                    path: err.path().map(Path::to_path_buf),
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        root = %root.display(),
        files = batch.files.len(),
        skipped = batch.skipped.len(),
        "Enumeration complete"
    );
    Ok(batch)
}

/// Map each excluded directory onto the path the walk will report for it.
fn excluded_dirs(root: &Path, exclude: &[PathBuf]) -> Vec<PathBuf> {
    if exclude.is_empty() {
        return Vec::new();
    }
    let Ok(canonical_root) = root.canonicalize() else {
        return Vec::new();
    };
    exclude
        .iter()
        .filter_map(|dir| {
            let canonical = dir.canonicalize().ok()?;
            let relative = canonical.strip_prefix(&canonical_root).ok()?;
            if relative.as_os_str().is_empty() {
                return None;
            }
            Some(root.join(relative))
        })
        .collect()
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn with_prefix(prefix: Option<&str>, key: String) -> String {
    match prefix.map(|p| p.trim_matches('/')) {
        Some(p) if !p.is_empty() => format!("{p}/{key}"),
        _ => key,
    }
}
