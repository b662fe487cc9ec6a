//! Git LFS pointer files and the content store behind them.
//!
//! A pointer is a small text blob committed in place of a large file:
//!
//! ```text
//! version https://git-lfs.github.com/spec/v1
//! oid sha256:4d7a2146...
//! size 12345
//! ```

use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::{namespaces, ObjectReader, StorageBackend, StorageError, StorageResult};

pub const META_FILE_IDENTIFIER: &str = "version https://git-lfs.github.com/spec/v1";
pub const META_FILE_OID_PREFIX: &str = "oid sha256:";
/// Pointers larger than this are never considered
pub const META_FILE_MAX_SIZE: usize = 1024;

static OID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-f0-9]{64}$").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error("content is missing the LFS file identifier")]
    MissingPrefix,
    #[error("content is not structured like an LFS pointer")]
    InvalidStructure,
    #[error("LFS pointer has an invalid oid")]
    InvalidOid,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pointer {
    pub oid: String,
    pub size: i64,
}

impl Pointer {
    pub fn is_valid(&self) -> bool {
        OID_PATTERN.is_match(&self.oid) && self.size >= 0
    }

    /// Storage key: `ab/cd/ef0123...`
    pub fn relative_path(&self) -> String {
        if self.oid.len() < 5 {
            return self.oid.clone();
        }
        format!("{}/{}/{}", &self.oid[0..2], &self.oid[2..4], &self.oid[4..])
    }

    /// Serialized pointer file content
    pub fn to_pointer_string(&self) -> String {
        format!(
            "{}\n{}{}\nsize {}\n",
            META_FILE_IDENTIFIER, META_FILE_OID_PREFIX, self.oid, self.size
        )
    }
}

/// Read at most [`META_FILE_MAX_SIZE`] bytes and parse them as a pointer
pub async fn read_pointer<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Pointer, PointerError> {
    let mut buf = Vec::with_capacity(META_FILE_MAX_SIZE);
    reader
        .take(META_FILE_MAX_SIZE as u64)
        .read_to_end(&mut buf)
        .await?;
    read_pointer_from_buffer(&buf)
}

pub fn read_pointer_from_buffer(buf: &[u8]) -> Result<Pointer, PointerError> {
    if !buf.starts_with(META_FILE_IDENTIFIER.as_bytes()) {
        return Err(PointerError::MissingPrefix);
    }
    let text = std::str::from_utf8(buf).map_err(|_| PointerError::InvalidStructure)?;

    let lines: Vec<&str> = text.split('\n').collect();
    if lines.len() < 3 {
        return Err(PointerError::InvalidStructure);
    }

    let oid = lines[1].trim_start_matches(META_FILE_OID_PREFIX);
    if oid.len() != 64 || !OID_PATTERN.is_match(oid) {
        return Err(PointerError::InvalidOid);
    }

    let size: i64 = lines[2]
        .trim_start_matches("size ")
        .parse()
        .map_err(|_| PointerError::InvalidStructure)?;
    if size < 0 {
        return Err(PointerError::InvalidStructure);
    }

    Ok(Pointer {
        oid: oid.to_string(),
        size,
    })
}

/// LFS object bytes, stored in the `lfs` namespace under the pointer's relative path
#[derive(Clone)]
pub struct ContentStore {
    storage: Arc<dyn StorageBackend>,
}

impl ContentStore {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub async fn get(&self, pointer: &Pointer) -> StorageResult<ObjectReader> {
        self.storage
            .get_stream(namespaces::LFS, &pointer.relative_path())
            .await
    }

    /// Store content after checking it hashes to the pointer's oid and size
    pub async fn put(&self, pointer: &Pointer, data: Bytes) -> StorageResult<()> {
        if data.len() as i64 != pointer.size {
            return Err(StorageError::Other(format!(
                "LFS object {} has size {}, expected {}",
                pointer.oid,
                data.len(),
                pointer.size
            )));
        }
        let actual = hex::encode(Sha256::digest(&data));
        if actual != pointer.oid {
            return Err(StorageError::Other(format!(
                "LFS object hash mismatch: {} != {}",
                actual, pointer.oid
            )));
        }
        self.storage
            .put(namespaces::LFS, &pointer.relative_path(), data)
            .await
    }

    pub async fn exists(&self, pointer: &Pointer) -> StorageResult<bool> {
        self.storage
            .exists(namespaces::LFS, &pointer.relative_path())
            .await
    }

    /// Direct download URL offered by the backend, if any
    pub async fn url(&self, pointer: &Pointer, name: &str) -> StorageResult<Option<String>> {
        self.storage
            .url(namespaces::LFS, &pointer.relative_path(), name)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    const OID: &str = "4d7a214614ab2935c943f9e0ff69d22eadbb8f32b1258daaa5e2ca24d17e2393";

    #[test]
    fn test_parse_pointer() {
        let text = format!("{}\noid sha256:{}\nsize 12345\n", META_FILE_IDENTIFIER, OID);
        let p = read_pointer_from_buffer(text.as_bytes()).unwrap();
        assert_eq!(p.oid, OID);
        assert_eq!(p.size, 12345);
        assert!(p.is_valid());
        assert_eq!(p.to_pointer_string(), text);
        assert_eq!(
            p.relative_path(),
            format!("4d/7a/{}", &OID[4..])
        );
    }

    #[test]
    fn test_reject_bad_pointers() {
        assert!(matches!(
            read_pointer_from_buffer(b"just some file"),
            Err(PointerError::MissingPrefix)
        ));
        assert!(matches!(
            read_pointer_from_buffer(META_FILE_IDENTIFIER.as_bytes()),
            Err(PointerError::InvalidStructure)
        ));
        let short_oid = format!("{}\noid sha256:abc\nsize 1\n", META_FILE_IDENTIFIER);
        assert!(matches!(
            read_pointer_from_buffer(short_oid.as_bytes()),
            Err(PointerError::InvalidOid)
        ));
        let upper = format!("{}\noid sha256:{}\nsize 1\n", META_FILE_IDENTIFIER, OID.to_uppercase());
        assert!(matches!(
            read_pointer_from_buffer(upper.as_bytes()),
            Err(PointerError::InvalidOid)
        ));
        let negative = format!("{}\noid sha256:{}\nsize -1\n", META_FILE_IDENTIFIER, OID);
        assert!(matches!(
            read_pointer_from_buffer(negative.as_bytes()),
            Err(PointerError::InvalidStructure)
        ));
    }

    #[tokio::test]
    async fn test_read_pointer_stops_at_max_size() {
        let mut data = format!("{}\noid sha256:{}\nsize 7\n", META_FILE_IDENTIFIER, OID).into_bytes();
        data.extend(std::iter::repeat(b'x').take(4096));
        // trailing garbage lands on line 4+ and is ignored
        let mut reader = std::io::Cursor::new(data);
        let p = read_pointer(&mut reader).await.unwrap();
        assert_eq!(p.size, 7);
        assert_eq!(reader.position(), META_FILE_MAX_SIZE as u64);
    }

    #[tokio::test]
    async fn test_content_store_verifies_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ContentStore::new(Arc::new(LocalStorage::new(dir.path().to_path_buf())));

        let data = Bytes::from_static(b"large file content");
        let pointer = Pointer {
            oid: hex::encode(Sha256::digest(&data)),
            size: data.len() as i64,
        };
        store.put(&pointer, data.clone()).await.unwrap();
        assert!(store.exists(&pointer).await.unwrap());

        let mut reader = store.get(&pointer).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);

        let wrong = Pointer {
            oid: OID.to_string(),
            size: data.len() as i64,
        };
        assert!(store.put(&wrong, data).await.is_err());
    }
}
