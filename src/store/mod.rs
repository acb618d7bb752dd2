//! Narrow seam over the remote object store.
//!
//! The service only ever needs four operations: write a blob, delete a blob,
//! issue a time-limited signed URL for a blob, and probe the backend for
//! readiness. Everything else (credentials, retries, endpoints) stays behind
//! the trait.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod s3;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The key does not exist in the store. Always kept distinct from
    /// transport or auth failures.
    #[error("object not found")]
    NotFound,
    /// Transport, auth, or backend failure. Retry-eligible upstream.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A time-limited URL for fetching a stored object.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Key-addressable binary store.
///
/// Implementations must be safe for concurrent use; the service shares one
/// handle across all request tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `bytes` under `key`, overwriting any existing object.
    async fn put_object(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()>;

    /// Remove the object under `key`. Returns `NotFound` if the key is
    /// absent.
    async fn delete_object(&self, key: &str) -> StoreResult<()>;

    /// Issue a signed URL for `key`, valid for `ttl` from now.
    async fn sign_url(&self, key: &str, ttl: Duration) -> StoreResult<SignedUrl>;

    /// Cheap probe used by the readiness endpoint.
    async fn health_check(&self) -> StoreResult<()>;
}
