//! ImageService — upload, retrieval, listing, and deletion of images,
//! keeping the metadata repository and the object store consistent.
//!
//! The two sequencing rules live here and nowhere else:
//! - upload writes the blob first and persists the descriptor only on
//!   success, with a compensating delete when persistence fails;
//! - delete removes the descriptor first (the image becomes unreachable)
//!   and treats blob removal as deferrable cleanup.
//!
//! Both sequences run to completion even if the calling request is
//! cancelled mid-flight, so cancellation can never strand a blob without a
//! descriptor or vice versa.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    config::UploadLimits,
    models::image::ImageDescriptor,
    repository::image_repository::{ImageRepository, ListFilter, RepoError},
    store::{ObjectStore, StoreError},
};

const MAX_FOLDER_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("image not found")]
    NotFound,
    #[error("image is not public")]
    Forbidden,
    #[error("image already exists")]
    Conflict,
    #[error("storage unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal inconsistency, see logs for the orphaned key")]
    PartialFailure,
}

pub type ImageResult<T> = Result<T, ImageError>;

/// Page of descriptors plus the cursor for the next page, if any.
#[derive(Debug)]
pub struct ImagePage {
    pub images: Vec<ImageDescriptor>,
    pub next_cursor: Option<String>,
}

#[derive(Clone)]
pub struct ImageService {
    repo: ImageRepository,
    store: Arc<dyn ObjectStore>,
    limits: UploadLimits,
    url_ttl: Duration,
}

impl ImageService {
    pub fn new(
        repo: ImageRepository,
        store: Arc<dyn ObjectStore>,
        limits: UploadLimits,
        url_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            store,
            limits,
            url_ttl,
        }
    }

    /// Validate the input, write the blob, persist the descriptor.
    ///
    /// The commit sequence is spawned onto its own task so that a client
    /// disconnect cannot abandon a freshly written blob before its
    /// descriptor exists.
    pub async fn upload(
        &self,
        bytes: Bytes,
        content_type: &str,
        is_public: bool,
        folder: Option<String>,
    ) -> ImageResult<ImageDescriptor> {
        if bytes.is_empty() {
            return Err(ImageError::InvalidInput("file is empty".into()));
        }
        if bytes.len() as u64 > self.limits.max_upload_bytes {
            return Err(ImageError::InvalidInput(format!(
                "file exceeds the maximum of {} bytes",
                self.limits.max_upload_bytes
            )));
        }
        if content_type.is_empty() {
            return Err(ImageError::InvalidInput("content type is required".into()));
        }
        if !self.limits.is_content_type_allowed(content_type) {
            return Err(ImageError::InvalidInput(format!(
                "content type `{content_type}` is not allowed"
            )));
        }
        if let Some(folder) = &folder {
            ensure_folder_safe(folder)?;
        }

        let id = Uuid::new_v4();
        let descriptor = ImageDescriptor {
            id,
            storage_key: derive_storage_key(id, content_type, folder.as_deref()),
            content_type: content_type.to_string(),
            size_bytes: bytes.len() as i64,
            is_public,
            folder,
            public_url: None,
            public_url_expires_at: None,
            created_at: Utc::now(),
        };

        let service = self.clone();
        let commit = tokio::spawn(async move { service.commit_upload(descriptor, bytes).await });
        match commit.await {
            Ok(result) => result,
            Err(err) => {
                error!(id = %id, operation = "upload", "upload commit task failed: {}", err);
                Err(ImageError::PartialFailure)
            }
        }
    }

    async fn commit_upload(
        &self,
        mut descriptor: ImageDescriptor,
        bytes: Bytes,
    ) -> ImageResult<ImageDescriptor> {
        let key = descriptor.storage_key.clone();

        self.store
            .put_object(&key, bytes, &descriptor.content_type)
            .await
            .map_err(|err| ImageError::StoreUnavailable(err.to_string()))?;

        if descriptor.is_public {
            match self.store.sign_url(&key, self.url_ttl).await {
                Ok(signed) => {
                    descriptor.public_url = Some(signed.url);
                    descriptor.public_url_expires_at = Some(signed.expires_at);
                }
                Err(err) => {
                    self.compensate_blob(descriptor.id, &key, "upload").await;
                    return Err(ImageError::StoreUnavailable(err.to_string()));
                }
            }
        }

        match self.repo.put(&descriptor).await {
            Ok(()) => {
                debug!(
                    "uploaded image {} ({} bytes) as {}",
                    descriptor.id, descriptor.size_bytes, key
                );
                Ok(descriptor)
            }
            Err(err) => {
                let mapped = map_repo_error(err);
                if self.compensate_blob(descriptor.id, &key, "upload").await {
                    Err(mapped)
                } else {
                    Err(ImageError::PartialFailure)
                }
            }
        }
    }

    /// Compensating delete for a blob whose descriptor never became durable.
    /// Returns false when the blob could not be removed and now needs
    /// reconciliation.
    async fn compensate_blob(&self, id: Uuid, key: &str, operation: &'static str) -> bool {
        match self.store.delete_object(key).await {
            Ok(()) | Err(StoreError::NotFound) => true,
            Err(err) => {
                error!(
                    id = %id,
                    key = key,
                    operation = operation,
                    "compensating delete failed, blob is orphaned: {}",
                    err
                );
                false
            }
        }
    }

    /// Fetch a descriptor by id, refreshing the URL cache when stale.
    pub async fn get(&self, id: Uuid) -> ImageResult<ImageDescriptor> {
        let descriptor = self.repo.get(id).await.map_err(map_repo_error)?;
        self.with_fresh_url(descriptor).await
    }

    /// Fetch a descriptor by storage key through the public route. Private
    /// images answer `Forbidden` even though the key exists.
    pub async fn get_by_public_key(&self, storage_key: &str) -> ImageResult<ImageDescriptor> {
        let descriptor = self
            .repo
            .get_by_key(storage_key)
            .await
            .map_err(map_repo_error)?;
        if !descriptor.is_public {
            return Err(ImageError::Forbidden);
        }
        self.with_fresh_url(descriptor).await
    }

    /// A stale cache is never served: public descriptors are re-signed on
    /// the spot, private ones have the cache withheld (an explicit refresh
    /// issues share links for those).
    async fn with_fresh_url(
        &self,
        mut descriptor: ImageDescriptor,
    ) -> ImageResult<ImageDescriptor> {
        if descriptor.has_valid_url(Utc::now()) {
            return Ok(descriptor);
        }
        if !descriptor.is_public {
            descriptor.public_url = None;
            descriptor.public_url_expires_at = None;
            return Ok(descriptor);
        }

        let signed = self
            .store
            .sign_url(&descriptor.storage_key, self.url_ttl)
            .await
            .map_err(map_store_error)?;
        // A concurrent delete may have removed the row; surface that as
        // NotFound rather than resurrecting the descriptor.
        self.repo
            .update_url_cache(descriptor.id, &signed.url, signed.expires_at)
            .await
            .map_err(map_repo_error)
    }

    /// List descriptors, newest first, ties broken by id ascending.
    /// Listing never refreshes URL caches.
    pub async fn list(
        &self,
        filter: ListFilter,
        cursor: Option<&str>,
        limit: Option<i64>,
    ) -> ImageResult<ImagePage> {
        let limit = limit
            .unwrap_or(self.limits.default_page_size)
            .clamp(1, self.limits.max_page_size);
        let position = cursor.map(decode_cursor).transpose()?;

        let fetch_limit = limit + 1;
        let mut images = self
            .repo
            .list(&filter, position, fetch_limit)
            .await
            .map_err(map_repo_error)?;

        let mut next_cursor = None;
        if images.len() as i64 == fetch_limit {
            images.pop();
            if let Some(last) = images.last() {
                next_cursor = Some(encode_cursor(last.created_at, last.id));
            }
        }

        Ok(ImagePage {
            images,
            next_cursor,
        })
    }

    /// Re-sign unconditionally, persist the new cache, and return the
    /// updated descriptor. Works for private images too (share links).
    pub async fn refresh_url(&self, id: Uuid) -> ImageResult<ImageDescriptor> {
        let descriptor = self.repo.get(id).await.map_err(map_repo_error)?;
        let signed = self
            .store
            .sign_url(&descriptor.storage_key, self.url_ttl)
            .await
            .map_err(map_store_error)?;
        self.repo
            .update_url_cache(id, &signed.url, signed.expires_at)
            .await
            .map_err(map_repo_error)
    }

    /// The only write path for the visibility flag. Leaves the URL cache
    /// untouched; the cached URL stays honest about its expiry either way.
    pub async fn set_visibility(&self, id: Uuid, is_public: bool) -> ImageResult<ImageDescriptor> {
        self.repo
            .update_visibility(id, is_public)
            .await
            .map_err(map_repo_error)
    }

    /// Remove the descriptor first, then the blob. A failed blob deletion
    /// still counts as a successful delete; the orphaned key is logged for
    /// reconciliation. Shielded from request cancellation like upload.
    pub async fn delete(&self, id: Uuid) -> ImageResult<()> {
        let service = self.clone();
        let commit = tokio::spawn(async move { service.commit_delete(id).await });
        match commit.await {
            Ok(result) => result,
            Err(err) => {
                error!(id = %id, operation = "delete", "delete commit task failed: {}", err);
                Err(ImageError::PartialFailure)
            }
        }
    }

    async fn commit_delete(&self, id: Uuid) -> ImageResult<()> {
        let descriptor = self.repo.delete(id).await.map_err(map_repo_error)?;
        match self.store.delete_object(&descriptor.storage_key).await {
            Ok(()) | Err(StoreError::NotFound) => {
                debug!("deleted image {} ({})", id, descriptor.storage_key);
            }
            Err(err) => {
                warn!(
                    id = %id,
                    key = %descriptor.storage_key,
                    operation = "delete",
                    "blob deletion failed, key left for cleanup: {}",
                    err
                );
            }
        }
        Ok(())
    }
}

fn map_repo_error(err: RepoError) -> ImageError {
    match err {
        RepoError::NotFound => ImageError::NotFound,
        RepoError::Conflict => ImageError::Conflict,
        RepoError::Sqlx(err) => ImageError::StoreUnavailable(format!("metadata database: {err}")),
    }
}

fn map_store_error(err: StoreError) -> ImageError {
    match err {
        StoreError::NotFound => ImageError::NotFound,
        StoreError::Unavailable(msg) => ImageError::StoreUnavailable(msg),
    }
}

/// Storage key for a fresh upload: `{folder}/{id}.{ext}` or `{id}.{ext}`.
fn derive_storage_key(id: Uuid, content_type: &str, folder: Option<&str>) -> String {
    let ext = extension_for(content_type);
    match folder {
        Some(folder) => format!("{folder}/{id}.{ext}"),
        None => format!("{id}.{ext}"),
    }
}

fn extension_for(content_type: &str) -> &str {
    match content_type {
        "image/jpeg" => "jpg",
        "image/svg+xml" => "svg",
        other => other.rsplit('/').next().unwrap_or("bin"),
    }
}

/// Reject folder labels that would break out of the key namespace.
fn ensure_folder_safe(folder: &str) -> ImageResult<()> {
    let valid = !folder.is_empty()
        && folder.len() <= MAX_FOLDER_LEN
        && !folder.starts_with('/')
        && !folder.ends_with('/')
        && !folder.contains("..")
        && !folder
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if valid {
        Ok(())
    } else {
        Err(ImageError::InvalidInput(format!(
            "invalid folder `{folder}`"
        )))
    }
}

// URL-safe alphabet: cursors travel in query strings.
fn encode_cursor(created_at: DateTime<Utc>, id: Uuid) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(format!("{}|{}", created_at.to_rfc3339(), id))
}

fn decode_cursor(cursor: &str) -> ImageResult<(DateTime<Utc>, Uuid)> {
    let malformed = || ImageError::InvalidInput("malformed cursor".into());
    let raw = general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| malformed())?;
    let text = String::from_utf8(raw).map_err(|_| malformed())?;
    let (created_at, id) = text.split_once('|').ok_or_else(malformed)?;
    let created_at = DateTime::parse_from_rfc3339(created_at)
        .map_err(|_| malformed())?
        .with_timezone(&Utc);
    let id = Uuid::parse_str(id).map_err(|_| malformed())?;
    Ok((created_at, id))
}
