//! Object storage access
//!
//! The batch reads IDF/EPW artifacts from, and writes result workbooks to, an
//! S3-compatible bucket. [`ObjectStore`] is the seam the batch works through;
//! [`S3Store`] is the production implementation (MinIO or AWS), and
//! [`mock::MemoryStore`] backs tests.

use crate::config::StorageConfig;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use std::path::Path;
use tracing::debug;

/// Bucket-scoped object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store reads and writes
    fn bucket(&self) -> &str;

    /// List every key under `prefix` (all pages)
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Check whether `key` exists
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Fetch an object's bytes
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store bytes under `key`, replacing any existing object
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Download an object into a local file, creating parent directories
    async fn download_to_file(&self, key: &str, dest: &Path) -> Result<()> {
        let data = self.get(key).await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, data).await?;
        Ok(())
    }
}

/// S3-compatible object store
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a store from an existing client
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a client for the configured endpoint with static credentials.
    ///
    /// Path-style addressing is forced so bucket names need no DNS entries
    /// (MinIO default).
    pub async fn connect(config: &StorageConfig) -> Self {
        debug!(
            endpoint = %config.endpoint,
            bucket = %config.bucket,
            "Creating S3 client"
        );

        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "energysim-static",
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(&config.endpoint)
            .force_path_style(true)
            .build();

        Self::new(Client::from_conf(s3_config), &config.bucket)
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| EngineError::S3(aws_sdk_s3::Error::from(e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            match response.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        debug!(prefix = %prefix, count = keys.len(), "Listed objects");
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                // Forbidden is treated like missing: MinIO answers 403 for
                // absent keys when list permission is withheld.
                let status = e.raw_response().map(|r| r.status().as_u16());
                let not_found = e
                    .as_service_error()
                    .map(|se| se.is_not_found())
                    .unwrap_or(false);
                if not_found || matches!(status, Some(403) | Some(404)) {
                    Ok(false)
                } else {
                    Err(EngineError::S3(aws_sdk_s3::Error::from(e)))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| EngineError::S3(aws_sdk_s3::Error::from(e)))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| EngineError::storage(format!("ByteStream error: {}", e)))?;

        Ok(bytes.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        debug!(
            "Uploading {} bytes to s3://{}/{}",
            data.len(),
            self.bucket,
            key
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| EngineError::S3(aws_sdk_s3::Error::from(e)))?;

        Ok(())
    }
}

pub mod mock {
    //! In-memory object store for tests.
    //!
    //! Available for integration tests and the adapter crate's tests.

    use super::*;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    /// Object store backed by a shared `BTreeMap`
    #[derive(Clone, Default)]
    pub struct MemoryStore {
        bucket: String,
        objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
    }

    impl MemoryStore {
        /// Create an empty store for `bucket`
        pub fn new(bucket: impl Into<String>) -> Self {
            Self {
                bucket: bucket.into(),
                objects: Arc::default(),
            }
        }

        /// Insert an object
        pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
            self.lock().insert(key.into(), data.into());
        }

        /// Copy of an object's bytes, if present
        pub fn object(&self, key: &str) -> Option<Vec<u8>> {
            self.lock().get(key).cloned()
        }

        /// All keys, sorted
        pub fn keys(&self) -> Vec<String> {
            self.lock().keys().cloned().collect()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
            self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        fn bucket(&self) -> &str {
            &self.bucket
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self
                .lock()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn exists(&self, key: &str) -> Result<bool> {
            Ok(self.lock().contains_key(key))
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.object(key)
                .ok_or_else(|| EngineError::NotFound(format!("s3://{}/{}", self.bucket, key)))
        }

        async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
            self.insert(key, data);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryStore;
    use super::*;

    #[tokio::test]
    async fn test_memory_store_list_by_prefix() {
        let store = MemoryStore::new("mmstore");
        store.insert("weather/epw/a.epw", b"a".to_vec());
        store.insert("weather/epw/b.epw", b"b".to_vec());
        store.insert("output_idf_files/x.idf", b"x".to_vec());

        let keys = store.list("weather/epw/").await.unwrap();
        assert_eq!(keys, vec!["weather/epw/a.epw", "weather/epw/b.epw"]);
    }

    #[tokio::test]
    async fn test_memory_store_missing_object() {
        let store = MemoryStore::new("mmstore");
        assert!(!store.exists("nope").await.unwrap());
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_download_to_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new("mmstore");
        store.insert("idf/a.idf", b"Version,24.1;".to_vec());

        let dest = dir.path().join("nested/run/a.idf");
        store.download_to_file("idf/a.idf", &dest).await.unwrap();

        let contents = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(contents, "Version,24.1;");
    }
}
