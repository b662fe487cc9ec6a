//! Local filesystem storage backend.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use super::backend::{ObjectReader, StorageBackend, StorageError, StorageResult};

/// Local filesystem storage backend.
///
/// Stores objects in a directory structure:
/// ```text
/// {base_path}/
///   {namespace}/
///     {key}          # key may contain `/` separators
/// ```
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the full path for a key, refusing keys that leave the namespace
    fn key_path(&self, namespace: &str, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::InvalidKey(format!("{}/{}", namespace, key)));
        }
        Ok(self.base_path.join(namespace).join(relative))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(namespace: &str, key: &str) -> impl FnOnce(std::io::Error) -> StorageError {
    let name = format!("{}/{}", namespace, key);
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(name)
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(namespace, key)?;
        let data = fs::read(&path)
            .await
            .map_err(not_found_or_io(namespace, key))?;
        Ok(Bytes::from(data))
    }

    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(namespace, key)?;
        self.ensure_parent(&path).await?;
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        let path = self.key_path(namespace, key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()), // Already deleted
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        let path = self.key_path(namespace, key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn size(&self, namespace: &str, key: &str) -> StorageResult<u64> {
        let path = self.key_path(namespace, key)?;
        let metadata = fs::metadata(&path)
            .await
            .map_err(not_found_or_io(namespace, key))?;
        Ok(metadata.len())
    }

    async fn get_stream(&self, namespace: &str, key: &str) -> StorageResult<ObjectReader> {
        let path = self.key_path(namespace, key)?;
        let file = fs::File::open(&path)
            .await
            .map_err(not_found_or_io(namespace, key))?;
        Ok(Box::new(file))
    }

    async fn url(&self, _namespace: &str, _key: &str, _name: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_local_storage_basic() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        let data = Bytes::from("hello world");
        storage.put("test", "ab/cd/ef0123", data.clone()).await.unwrap();

        let retrieved = storage.get("test", "ab/cd/ef0123").await.unwrap();
        assert_eq!(retrieved, data);

        assert!(storage.exists("test", "ab/cd/ef0123").await.unwrap());
        assert!(!storage.exists("test", "nonexistent").await.unwrap());

        let size = storage.size("test", "ab/cd/ef0123").await.unwrap();
        assert_eq!(size, 11);

        storage.delete("test", "ab/cd/ef0123").await.unwrap();
        assert!(!storage.exists("test", "ab/cd/ef0123").await.unwrap());
        // Deleting twice is fine
        storage.delete("test", "ab/cd/ef0123").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_storage_streaming() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        storage
            .put("avatars", "0123abcd", Bytes::from_static(b"streaming test data"))
            .await
            .unwrap();

        let mut reader = storage.get_stream("avatars", "0123abcd").await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"streaming test data");
    }

    #[tokio::test]
    async fn test_local_storage_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        for key in ["../secret", "/etc/passwd", "a/../../b", ""] {
            let err = storage.get("lfs", key).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "key {:?}", key);
        }
    }

    #[tokio::test]
    async fn test_local_storage_missing_and_url() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path().to_path_buf());

        let err = storage.get_stream("lfs", "aa/bb/cc").await.err().unwrap();
        assert!(matches!(err, StorageError::NotFound(_)));
        assert!(storage.url("lfs", "aa/bb/cc", "file.bin").await.unwrap().is_none());
    }
}
