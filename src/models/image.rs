//! Durable metadata record for one uploaded image.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata for a single uploaded image.
///
/// The descriptor tracks where the bytes live in the remote object store and
/// caches the most recently issued signed URL. It never holds the content
/// itself.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ImageDescriptor {
    /// Unique identifier, assigned at upload and immutable afterwards.
    pub id: Uuid,

    /// Key of the blob in the remote object store. Derived from `id` (and
    /// `folder` when set), unique per descriptor, immutable.
    pub storage_key: String,

    /// Content type (MIME type) captured at upload.
    pub content_type: String,

    /// Size of the uploaded bytes.
    pub size_bytes: i64,

    /// Whether the image may be fetched through the public-key route.
    /// Mutable only via the visibility-change operation.
    pub is_public: bool,

    /// Optional logical grouping label, set at upload, immutable.
    pub folder: Option<String>,

    /// Cached signed URL, if one has been issued.
    pub public_url: Option<String>,

    /// Expiry of the cached URL. A cache past this instant is stale and is
    /// refreshed or withheld, never served.
    pub public_url_expires_at: Option<DateTime<Utc>>,

    /// Timestamp of the upload.
    pub created_at: DateTime<Utc>,
}

impl ImageDescriptor {
    /// Whether the cached URL is present and still valid at `now`.
    pub fn has_valid_url(&self, now: DateTime<Utc>) -> bool {
        match (&self.public_url, self.public_url_expires_at) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }
}
