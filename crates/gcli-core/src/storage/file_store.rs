use async_trait::async_trait;
use std::path::{Path, PathBuf};

use gcli_types::StorageError;

use super::file_utils::atomic_write;
use super::KeyValueStore;

/// One file per key under a root directory; `a/b` lives at `<root>/a/b`.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for segment in key.split('/') {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains('\\')
                || segment.ends_with(".tmp")
            {
                return Err(StorageError::InvalidKey { key: key.to_string() });
            }
            path.push(segment);
        }
        Ok(path)
    }

    async fn collect_keys(&self, dir: PathBuf, out: &mut Vec<String>) -> Result<(), StorageError> {
        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::from_io_error(&e)),
            };
            while let Some(entry) =
                entries.next_entry().await.map_err(|e| StorageError::from_io_error(&e))?
            {
                let path = entry.path();
                let file_type =
                    entry.file_type().await.map_err(|e| StorageError::from_io_error(&e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    out.push(key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from_io_error(&e)),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        atomic_write(&path, &value).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::from_io_error(&e)),
        }
    }

    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // Only walk the directory the prefix points into.
        let start = match prefix.rfind('/') {
            Some(idx) => self.path_for(&prefix[..idx])?,
            None => self.root.clone(),
        };
        let mut keys = Vec::new();
        self.collect_keys(start, &mut keys).await?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
