//! S3-compatible object store backend.
//!
//! Works against AWS S3 as well as R2/MinIO-style deployments through the
//! optional endpoint override (which also switches to path-style
//! addressing). Credentials come from the default provider chain.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, retry::RetryConfig, timeout::TimeoutConfig};
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::ByteStream,
};
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::store::{ObjectStore, SignedUrl, StoreError, StoreResult};

const MAX_RETRIES: u32 = 3;
const OPERATION_TIMEOUT_SECS: u64 = 30;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Build the SDK client from the default credential chain plus the
    /// explicit settings in `cfg`.
    pub async fn new(cfg: &StoreConfig) -> Self {
        let retry_config = RetryConfig::standard()
            .with_max_attempts(MAX_RETRIES)
            .with_initial_backoff(Duration::from_millis(50));
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_secs(OPERATION_TIMEOUT_SECS))
            .build();

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .retry_config(retry_config)
            .timeout_config(timeout_config);
        if let Some(region) = &cfg.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &cfg.endpoint_url {
            builder = builder.endpoint_url(endpoint_url).force_path_style(true);
        }
        let client = Client::from_conf(builder.build());

        info!(
            "Initialized S3 object store for bucket {} with {} max retries",
            cfg.bucket, MAX_RETRIES
        );

        Self {
            client,
            bucket: cfg.bucket.clone(),
        }
    }

    fn classify<E, R>(&self, operation: &'static str, key: &str, err: SdkError<E, R>) -> StoreError
    where
        E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
        R: std::fmt::Debug,
    {
        if let SdkError::ServiceError(ctx) = &err {
            if matches!(
                ctx.err().code(),
                Some("NoSuchKey" | "NotFound" | "NoSuchBucket")
            ) {
                return StoreError::NotFound;
            }
        }
        StoreError::Unavailable(format!(
            "{} {}: {}",
            operation,
            key,
            DisplayErrorContext(&err)
        ))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()> {
        debug!("putting object {} ({} bytes)", key, bytes.len());
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| self.classify("put_object", key, err))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> StoreResult<()> {
        debug!("deleting object {}", key);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| self.classify("delete_object", key, err))?;
        Ok(())
    }

    async fn sign_url(&self, key: &str, ttl: Duration) -> StoreResult<SignedUrl> {
        let presigning_config = PresigningConfig::expires_in(ttl)
            .map_err(|err| StoreError::Unavailable(format!("presigning config: {}", err)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .map_err(|err| self.classify("sign_url", key, err))?;

        Ok(SignedUrl {
            url: presigned.uri().to_string(),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|err| self.classify("head_bucket", &self.bucket, err))?;
        Ok(())
    }
}
