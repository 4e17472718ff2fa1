/*!
Local filesystem storage backend.
*/

use super::{SlotInfo, StorageBackend};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use keepsake_retry::{retry, RetryError, RetryPolicy};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Prefix of in-progress temp files; they are never reported as slots
const TEMP_PREFIX: &str = ".keepsake-";

/// Local filesystem storage backend
///
/// Every slot is a file below `base_dir`; slot names may contain `/` to use
/// subdirectories, which are created on demand. Writes go to a temp file in the
/// target directory and are renamed over the slot file, so a failed write never
/// leaves a half-written slot behind. Each attempt runs on the blocking pool;
/// transient I/O errors are retried according to the configured [`RetryPolicy`], with
/// the backoff awaited rather than slept on a blocking thread.
///
/// # Example
/// ```rust,no_run
/// use keepsake_core::storage::{LocalFileStorage, StorageBackend};
/// use keepsake_core::Bytes;
///
/// # async fn demo() -> std::io::Result<()> {
/// let storage = LocalFileStorage::new("/var/lib/mygame/saves");
/// storage.write("profile.dat", Bytes::from_static(b"bytes")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    retry: RetryPolicy,
}

impl LocalFileStorage {
    /// Create a backend rooted at `base_dir`
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            retry: RetryPolicy::local_storage(),
        }
    }

    /// Replace the retry policy used for file I/O
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a slot name to a file below the base directory
    ///
    /// Only plain relative names are accepted; `..`, roots and prefixes are rejected.
    fn resolve_path(&self, slot: &str) -> io::Result<PathBuf> {
        let relative = Path::new(slot);
        let is_plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if slot.trim().is_empty() || !is_plain {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid slot name '{slot}'"),
            ));
        }
        Ok(self.base_dir.join(relative))
    }

    /// Run `op` on the blocking pool, once per attempt, under the retry policy
    async fn run_retried<T, F>(&self, operation: &'static str, op: F) -> io::Result<T>
    where
        F: Fn() -> io::Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let op = Arc::new(op);
        retry(operation, &self.retry, |_| {
            let op = Arc::clone(&op);
            async move { run_blocking(move || op()).await }
        })
        .await
        .map_err(RetryError::into_inner)
    }
}

async fn run_blocking<T, F>(f: F) -> io::Result<T>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("I/O worker failed: {e}")))?
}

fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "slot path has no parent directory")
    })?;
    fs::create_dir_all(parent)?;

    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn collect_slots(root: &Path, dir: &Path, out: &mut Vec<SlotInfo>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_slots(root, &path, out)?;
            continue;
        }
        if !file_type.is_file() || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(SlotInfo {
            name,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalFileStorage {
    async fn read(&self, slot: &str) -> io::Result<Option<Bytes>> {
        let path = self.resolve_path(slot)?;
        debug!(path = %path.display(), "reading slot file");
        let data = self
            .run_retried("read", move || read_optional(&path))
            .await?;
        Ok(data.map(Bytes::from))
    }

    async fn write(&self, slot: &str, data: Bytes) -> io::Result<()> {
        let path = self.resolve_path(slot)?;
        debug!(path = %path.display(), bytes = data.len(), "writing slot file");
        self.run_retried("write", move || write_atomic(&path, &data))
            .await
    }

    async fn delete(&self, slot: &str) -> io::Result<()> {
        let path = self.resolve_path(slot)?;
        debug!(path = %path.display(), "deleting slot file");
        self.run_retried("delete", move || remove_if_present(&path))
            .await
    }

    async fn exists(&self, slot: &str) -> io::Result<bool> {
        let path = self.resolve_path(slot)?;
        run_blocking(move || path.try_exists()).await
    }

    async fn list(&self) -> io::Result<Vec<SlotInfo>> {
        let root = self.base_dir.clone();
        self.run_retried("list", move || {
            let mut slots = Vec::new();
            if root.is_dir() {
                collect_slots(&root, &root, &mut slots)?;
            }
            slots.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(slots)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());

        let data = Bytes::from_static(b"slot bytes");
        storage.write("save.dat", data.clone()).await.unwrap();
        assert!(storage.exists("save.dat").await.unwrap());
        assert_eq!(storage.read("save.dat").await.unwrap(), Some(data));

        storage.delete("save.dat").await.unwrap();
        assert!(!storage.exists("save.dat").await.unwrap());
        assert!(!temp_dir.path().join("save.dat").exists());
    }

    #[tokio::test]
    async fn test_missing_slot_reads_as_none() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());
        assert_eq!(storage.read("nothing.dat").await.unwrap(), None);
        storage.delete("nothing.dat").await.unwrap();
    }

    #[tokio::test]
    async fn test_truncate_keeps_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());
        storage.write("save.dat", Bytes::from_static(b"data")).await.unwrap();
        storage.truncate("save.dat").await.unwrap();

        let on_disk = fs::read(temp_dir.path().join("save.dat")).unwrap();
        assert!(on_disk.is_empty());
    }

    #[tokio::test]
    async fn test_nested_slots_create_directories_and_list() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path().join("saves"));

        assert!(storage.list().await.unwrap().is_empty());

        storage.write("profiles/alice.dat", Bytes::from_static(b"1")).await.unwrap();
        storage.write("global.dat", Bytes::from_static(b"22")).await.unwrap();

        let slots = storage.list().await.unwrap();
        let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["global.dat", "profiles/alice.dat"]);
        assert_eq!(slots[0].size, 2);
        assert!(slots[0].modified.is_some());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());
        storage.write("save.dat", Bytes::from_static(b"first, longer")).await.unwrap();
        storage.write("save.dat", Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(
            storage.read("save.dat").await.unwrap().unwrap(),
            &b"second"[..]
        );
        // no temp files left behind
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_escaping_slot_names_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::new(temp_dir.path());
        for slot in ["../outside.dat", "/etc/passwd", "", "a/../../b"] {
            let err = storage
                .write(slot, Bytes::from_static(b"x"))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidInput, "slot {slot:?}");
        }
    }
}
