//! AWS S3 (or S3-compatible, e.g. MinIO) storage implementation.
//!
//! Keys are stored under `{bucket}/{prefix}/{key}`. Listing pages through
//! `ListObjectsV2` continuation tokens.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::{AppError, Result};
use crate::storage::{ObjectStore, join_key};

/// S3-backed object store.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage using credentials and endpoint from the environment.
    pub async fn from_env(bucket: String, prefix: String) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        Ok(Self::new(client, bucket, prefix))
    }

    fn full_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    fn relative_key<'a>(&self, full: &'a str) -> &'a str {
        let prefix = self.prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return full;
        }
        full.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(full)
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let full_prefix = self.full_key(prefix);
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::storage(e.into_service_error()))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    keys.push(self.relative_key(key).to_string());
                }
            }

            match output.next_continuation_token() {
                Some(token) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output.body.collect().await.map_err(AppError::storage)?;
                Ok(Some(bytes.into_bytes().to_vec()))
            }
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_no_such_key() {
                    log::debug!("No object at s3://{}/{}", self.bucket, full_key);
                    Ok(None)
                } else {
                    Err(AppError::storage(service_err))
                }
            }
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let full_key = self.full_key(key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .body(ByteStream::from(bytes))
            .content_type("application/json")
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        log::debug!("Wrote s3://{}/{}", self.bucket, full_key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key);
        // S3 reports success for missing keys.
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| AppError::storage(e.into_service_error()))?;

        log::debug!("Deleted s3://{}/{}", self.bucket, full_key);
        Ok(())
    }
}
