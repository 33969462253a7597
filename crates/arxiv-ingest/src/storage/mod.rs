//! Object storage for staged batches, the checkpoint and the run lock

use anyhow::{anyhow, Context, Result};
use arxiv_common::{EtlError, EtlResult};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

pub mod config;
pub mod memory;

pub use config::StorageConfig;
pub use memory::MemoryStore;

/// Minimal key/value view of a bucket.
///
/// `list` only returns direct children of `prefix` (the `/` delimiter is
/// applied), so `metadata/` never picks up `finished_metadata/` or nested
/// folders.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object content, or `None` when the key does not exist
    async fn get(&self, key: &str) -> EtlResult<Option<Vec<u8>>>;

    async fn put(&self, key: &str, data: Vec<u8>) -> EtlResult<()>;

    async fn exists(&self, key: &str) -> EtlResult<bool>;

    async fn delete(&self, key: &str) -> EtlResult<()>;

    async fn list(&self, prefix: &str) -> EtlResult<Vec<String>>;

    async fn copy(&self, source_key: &str, dest_key: &str) -> EtlResult<()>;

    /// Copy then delete; there is no atomic rename in S3.
    async fn rename(&self, source_key: &str, dest_key: &str) -> EtlResult<()> {
        self.copy(source_key, dest_key).await?;
        self.delete(source_key).await
    }
}

fn storage_error(err: anyhow::Error) -> EtlError {
    EtlError::Storage(format!("{err:#}"))
}

/// S3 (or S3 compatible) bucket
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        debug!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint,
            "Initializing storage"
        );

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "arxiv-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version_latest()
                    .credentials_provider(credentials)
                    .region(Region::new(config.region.clone()))
            },
            _ => {
                let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(config.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&sdk_config)
            },
        };

        s3_config_builder = s3_config_builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(bucket = %config.bucket, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self, data))]
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<()> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload to S3: {key}"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        debug!("Downloading from s3://{}/{}", self.bucket, key);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None);
            },
            Err(e) => return Err(anyhow!(e).context(format!("Failed to download from S3: {key}"))),
        };

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);

        Ok(Some(data))
    }

    #[instrument(skip(self))]
    async fn head(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(anyhow!(e).context(format!("Failed to check S3 object existence: {key}"))),
        }
    }

    #[instrument(skip(self))]
    async fn remove(&self, key: &str) -> Result<()> {
        debug!("Deleting s3://{}/{}", self.bucket, key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete from S3: {key}"))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_children(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/")
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .with_context(|| format!("Failed to list S3 objects under {prefix}"))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string))
                    .filter(|key| key != prefix),
            );

            match response.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        debug!("Listed {} objects in s3://{}/{}", keys.len(), self.bucket, prefix);

        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn copy_object(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let copy_source = format!("{}/{}", self.bucket, source_key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .send()
            .await
            .with_context(|| format!("Failed to copy S3 object {source_key} to {dest_key}"))?;

        info!(
            "Copied s3://{}/{} to s3://{}/{}",
            self.bucket, source_key, self.bucket, dest_key
        );

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn get(&self, key: &str) -> EtlResult<Option<Vec<u8>>> {
        self.download(key).await.map_err(storage_error)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> EtlResult<()> {
        self.upload(key, data).await.map_err(storage_error)
    }

    async fn exists(&self, key: &str) -> EtlResult<bool> {
        self.head(key).await.map_err(storage_error)
    }

    async fn delete(&self, key: &str) -> EtlResult<()> {
        self.remove(key).await.map_err(storage_error)
    }

    async fn list(&self, prefix: &str) -> EtlResult<Vec<String>> {
        self.list_children(prefix).await.map_err(storage_error)
    }

    async fn copy(&self, source_key: &str, dest_key: &str) -> EtlResult<()> {
        self.copy_object(source_key, dest_key)
            .await
            .map_err(storage_error)
    }
}
