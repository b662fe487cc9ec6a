//! S3-compatible storage backend.
//!
//! Works with AWS S3, MinIO, R2 and friends. Besides plain reads and writes it
//! can presign GET URLs so LFS downloads can bypass the server.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Builder, Region},
    presigning::PresigningConfig,
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use serde::Deserialize;

use super::backend::{ObjectReader, StorageBackend, StorageError, StorageResult};

/// S3 storage backend configuration
#[derive(Clone, Debug, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// Optional prefix for all keys (e.g., "gitforge/")
    #[serde(default)]
    pub prefix: Option<String>,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, R2, etc.)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Force path-style URLs (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Lifetime of presigned download URLs
    #[serde(default = "default_presign_ttl")]
    pub presign_ttl_secs: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presign_ttl() -> u64 {
    5 * 60
}

/// S3-compatible storage backend
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    presign_ttl: Duration,
}

impl S3Storage {
    /// Create a new S3 storage backend from config
    pub async fn new(config: S3Config) -> Self {
        let mut builder = Builder::new()
            .region(Region::new(config.region))
            .force_path_style(config.force_path_style);

        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        // Load credentials from environment or use defaults
        let sdk_config = aws_config::load_from_env().await;
        if let Some(creds) = sdk_config.credentials_provider() {
            builder = builder.credentials_provider(creds);
        }

        let client = Client::from_conf(builder.build());

        Self {
            client,
            bucket: config.bucket,
            prefix: config.prefix,
            presign_ttl: Duration::from_secs(config.presign_ttl_secs),
        }
    }

    /// Build the full S3 key from namespace and key
    fn full_key(&self, namespace: &str, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}/{}", prefix, namespace, key),
            None => format!("{}/{}", namespace, key),
        }
    }

    async fn get_object(
        &self,
        namespace: &str,
        key: &str,
    ) -> StorageResult<aws_sdk_s3::operation::get_object::GetObjectOutput> {
        self.client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(namespace, key))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_no_such_key()) == Some(true) {
                    StorageError::NotFound(format!("{}/{}", namespace, key))
                } else {
                    StorageError::Other(e.to_string())
                }
            })
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    async fn get(&self, namespace: &str, key: &str) -> StorageResult<Bytes> {
        let result = self.get_object(namespace, key).await?;
        let data = result
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(data.into_bytes())
    }

    async fn put(&self, namespace: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(namespace, key))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(namespace, key))
            .send()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, namespace: &str, key: &str) -> StorageResult<bool> {
        match self.size(namespace, key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn size(&self, namespace: &str, key: &str) -> StorageResult<u64> {
        let result = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.full_key(namespace, key))
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().map(|s| s.is_not_found()) == Some(true) {
                    StorageError::NotFound(format!("{}/{}", namespace, key))
                } else {
                    StorageError::Other(e.to_string())
                }
            })?;
        Ok(result.content_length().unwrap_or(0).max(0) as u64)
    }

    async fn get_stream(&self, namespace: &str, key: &str) -> StorageResult<ObjectReader> {
        let result = self.get_object(namespace, key).await?;
        Ok(Box::new(result.body.into_async_read()))
    }

    async fn url(&self, namespace: &str, key: &str, name: &str) -> StorageResult<Option<String>> {
        let presigning = PresigningConfig::builder()
            .expires_in(self.presign_ttl)
            .build()
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let req = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(namespace, key))
            .response_content_disposition(format!(
                "attachment; filename=\"{}\"",
                name.replace('"', "")
            ))
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let url = req.uri().to_string();
        tracing::debug!(%url, "presigned URL generated");
        Ok(Some(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_from_toml() {
        let config: S3Config = toml::from_str(
            r#"
            bucket = "forge"
            endpoint = "http://localhost:9000"
            force_path_style = true
            "#,
        )
        .unwrap();
        assert_eq!(config.bucket, "forge");
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.presign_ttl_secs, 300);
        assert!(config.prefix.is_none());
    }
}
