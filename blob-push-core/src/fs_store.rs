//! Local-filesystem [`BlobStore`]: a container is a directory, an object is a file below it.
//!
//! Writes go to a uniquely named temporary file next to the destination and are renamed
//! into place, so a failed transfer never leaves a partial object behind. Listing returns
//! keys in lexicographic order and uses the last key of a page as the continuation marker.

use std::collections::BinaryHeap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::contract::{BlobStore, ListPage, ObjectBody, RemoteObject, TransferOptions};
use crate::error::StoreError;

const MAX_WRITE_BUFFER: usize = 1024 * 1024;
const TMP_SUFFIX: &str = ".blob-push.tmp";

#[derive(Debug, Clone)]
pub struct FsStore {
    base: PathBuf,
    container: String,
}

impl FsStore {
    pub fn new(base: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            container: container.into(),
        }
    }

    pub fn container_dir(&self) -> PathBuf {
        self.base.join(&self.container)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let valid = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.container_dir().join(relative))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn create_container(&self, name: &str) -> Result<(), StoreError> {
        let dir = self.base.join(name);
        if tokio::fs::try_exists(&dir).await? {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        tokio::fs::create_dir_all(&dir).await?;
        info!(container = name, path = %dir.display(), "Created container directory");
        Ok(())
    }

    async fn put_object(
        &self,
        key: &str,
        mut body: ObjectBody,
        options: &TransferOptions,
    ) -> Result<u64, StoreError> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = dest.with_file_name(format!(".{file_name}.{}{TMP_SUFFIX}", Uuid::new_v4()));

        let write = async {
            let file = tokio::fs::File::create(&tmp).await?;
            let capacity = options.chunk_size.clamp(1, MAX_WRITE_BUFFER);
            let mut writer = BufWriter::with_capacity(capacity, file);
            let bytes = tokio::io::copy(&mut body, &mut writer).await?;
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
            tokio::fs::rename(&tmp, &dest).await?;
            Ok::<u64, std::io::Error>(bytes)
        };

        match write.await {
            Ok(bytes) => {
                debug!(key, bytes, path = %dest.display(), "Stored object");
                Ok(bytes)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(StoreError::Io(e))
            }
        }
    }

    async fn list_objects(
        &self,
        marker: Option<String>,
        page_size: usize,
    ) -> Result<ListPage, StoreError> {
        let dir = self.container_dir();
        let page_size = page_size.max(1);
        tokio::task::spawn_blocking(move || list_dir_page(&dir, marker.as_deref(), page_size))
            .await
            .map_err(|e| StoreError::Transport(format!("listing task failed: {e}")))?
    }
}

/// Collect the `page_size` smallest keys greater than `marker`.
///
/// The walk keeps at most `page_size + 1` candidates in a max-heap, so memory is bounded
/// by one page regardless of container size, and only returned objects are stat'ed.
fn list_dir_page(
    dir: &Path,
    marker: Option<&str>,
    page_size: usize,
) -> Result<ListPage, StoreError> {
    if !dir.is_dir() {
        return Err(StoreError::NotFound(dir.display().to_string()));
    }

    let mut candidates: BinaryHeap<(String, PathBuf)> = BinaryHeap::with_capacity(page_size + 1);
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| StoreError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(TMP_SUFFIX) {
            continue;
        }
        let key = object_key(dir, entry.path());
        if marker.is_some_and(|m| key.as_str() <= m) {
            continue;
        }
        if candidates.len() > page_size {
            let beyond_page = candidates
                .peek()
                .is_some_and(|(largest, _)| key >= *largest);
            if beyond_page {
                continue;
            }
            candidates.pop();
        }
        candidates.push((key, entry.into_path()));
    }

    let mut page = candidates.into_sorted_vec();
    let has_more = page.len() > page_size;
    page.truncate(page_size);

    let objects: Vec<RemoteObject> = page
        .into_iter()
        .map(|(key, path)| {
            let metadata = std::fs::metadata(&path).ok();
            RemoteObject {
                key,
                size: metadata.as_ref().map(|m| m.len()),
                last_modified: metadata.and_then(|m| m.modified().ok()),
            }
        })
        .collect();
    let next_marker = if has_more {
        objects.last().map(|o| o.key.clone())
    } else {
        None
    };
    Ok(ListPage {
        objects,
        next_marker,
    })
}

fn object_key(dir: &Path, path: &Path) -> String {
    path.strip_prefix(dir)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_hold_the_smallest_keys_after_the_marker() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("container");
        // Written out of order so the walk does not hand keys over sorted.
        for key in ["e.txt", "b/2.txt", "a.txt", "d.txt", "b/1.txt"] {
            let path = dir.join(key);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, key.as_bytes()).unwrap();
        }
        std::fs::write(dir.join(format!(".x.txt.tmp{TMP_SUFFIX}")), b"partial").unwrap();

        let keys = |page: &ListPage| page.objects.iter().map(|o| o.key.clone()).collect::<Vec<_>>();

        let first = list_dir_page(&dir, None, 2).unwrap();
        assert_eq!(keys(&first), vec!["a.txt", "b/1.txt"]);
        assert_eq!(first.next_marker.as_deref(), Some("b/1.txt"));
        assert_eq!(first.objects[0].size, Some(5));

        let second = list_dir_page(&dir, first.next_marker.as_deref(), 2).unwrap();
        assert_eq!(keys(&second), vec!["b/2.txt", "d.txt"]);
        assert_eq!(second.next_marker.as_deref(), Some("d.txt"));

        let last = list_dir_page(&dir, second.next_marker.as_deref(), 2).unwrap();
        assert_eq!(keys(&last), vec!["e.txt"]);
        assert_eq!(last.next_marker, None);
    }

    #[test]
    fn exact_page_has_no_marker() {
        let base = tempfile::tempdir().unwrap();
        let dir = base.path().join("container");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a.txt"), b"a").unwrap();
        std::fs::write(dir.join("b.txt"), b"b").unwrap();

        let page = list_dir_page(&dir, None, 2).unwrap();
        assert_eq!(page.objects.len(), 2);
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn rejects_keys_escaping_the_container() {
        let store = FsStore::new("/tmp/base", "container");
        assert!(matches!(
            store.object_path("../outside.txt"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.object_path("/etc/passwd"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.object_path(""), Err(StoreError::InvalidKey(_))));
        assert_eq!(
            store.object_path("b/b.txt").unwrap(),
            PathBuf::from("/tmp/base/container/b/b.txt")
        );
    }
}
