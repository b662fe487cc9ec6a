//! Storage configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use super::{LocalStorage, S3Config, S3Storage, StorageBackend};

/// Storage backend type
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageType {
    /// Local filesystem storage; defaults to `<data_path>/storage`
    Local {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// S3-compatible storage (AWS S3, MinIO, R2, etc.)
    S3(S3Config),
}

impl Default for StorageType {
    fn default() -> Self {
        StorageType::Local { path: None }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Storage backend type
    #[serde(flatten)]
    pub storage_type: StorageType,
}

impl StorageConfig {
    /// Build a storage backend from this config
    pub async fn build(&self, data_path: &Path) -> std::io::Result<Arc<dyn StorageBackend>> {
        Ok(match &self.storage_type {
            StorageType::Local { path } => {
                let path = path.clone().unwrap_or_else(|| data_path.join("storage"));
                tokio::fs::create_dir_all(&path).await?;
                Arc::new(LocalStorage::new(path))
            }
            StorageType::S3(config) => Arc::new(S3Storage::new(config.clone()).await),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_variants() {
        let local: StorageConfig = toml::from_str(r#"type = "local""#).unwrap();
        assert!(matches!(local.storage_type, StorageType::Local { path: None }));

        let s3: StorageConfig = toml::from_str(
            r#"
            type = "s3"
            bucket = "lfs"
            region = "eu-west-1"
            "#,
        )
        .unwrap();
        match s3.storage_type {
            StorageType::S3(config) => {
                assert_eq!(config.bucket, "lfs");
                assert_eq!(config.region, "eu-west-1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_build_local_defaults_under_data_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = StorageConfig::default().build(dir.path()).await.unwrap();
        storage
            .put("lfs", "aa/bb/ccdd", bytes::Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(dir.path().join("storage/lfs/aa/bb/ccdd").exists());
    }
}
