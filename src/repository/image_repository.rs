//! SQLite-backed metadata repository.
//!
//! Every operation is atomic with respect to a single descriptor row; the
//! service relies on that as its only consistency boundary for racing
//! operations on the same id.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::models::image::ImageDescriptor;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("descriptor not found")]
    NotFound,
    #[error("id or storage key already exists")]
    Conflict,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Filter applied by `list`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub folder: Option<String>,
    pub is_public: Option<bool>,
}

/// Keyset position: rows strictly after `(created_at DESC, id ASC)`.
pub type ListPosition = (DateTime<Utc>, Uuid);

const DESCRIPTOR_COLUMNS: &str = "id, storage_key, content_type, size_bytes, is_public, folder, \
     public_url, public_url_expires_at, created_at";

#[derive(Clone)]
pub struct ImageRepository {
    db: Arc<SqlitePool>,
}

impl ImageRepository {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a new descriptor. Fails with `Conflict` when the id or the
    /// storage key is already taken.
    pub async fn put(&self, descriptor: &ImageDescriptor) -> RepoResult<()> {
        let result = sqlx::query(
            "INSERT INTO images (id, storage_key, content_type, size_bytes, is_public, folder, \
             public_url, public_url_expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(descriptor.id)
        .bind(&descriptor.storage_key)
        .bind(&descriptor.content_type)
        .bind(descriptor.size_bytes)
        .bind(descriptor.is_public)
        .bind(&descriptor.folder)
        .bind(&descriptor.public_url)
        .bind(descriptor.public_url_expires_at)
        .bind(descriptor.created_at)
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Conflict),
            Err(err) => Err(RepoError::Sqlx(err)),
        }
    }

    pub async fn get(&self, id: Uuid) -> RepoResult<ImageDescriptor> {
        sqlx::query_as::<_, ImageDescriptor>(&format!(
            "SELECT {DESCRIPTOR_COLUMNS} FROM images WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(not_found_or_sqlx)
    }

    pub async fn get_by_key(&self, storage_key: &str) -> RepoResult<ImageDescriptor> {
        sqlx::query_as::<_, ImageDescriptor>(&format!(
            "SELECT {DESCRIPTOR_COLUMNS} FROM images WHERE storage_key = ?"
        ))
        .bind(storage_key)
        .fetch_one(&*self.db)
        .await
        .map_err(not_found_or_sqlx)
    }

    /// Fetch up to `fetch_limit` descriptors ordered by `created_at` DESC,
    /// ties broken by `id` ASC, starting after `position` when given.
    pub async fn list(
        &self,
        filter: &ListFilter,
        position: Option<ListPosition>,
        fetch_limit: i64,
    ) -> RepoResult<Vec<ImageDescriptor>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {DESCRIPTOR_COLUMNS} FROM images WHERE 1 = 1"
        ));

        if let Some(folder) = &filter.folder {
            builder.push(" AND folder = ");
            builder.push_bind(folder.clone());
        }
        if let Some(is_public) = filter.is_public {
            builder.push(" AND is_public = ");
            builder.push_bind(is_public);
        }
        if let Some((created_at, id)) = position {
            builder.push(" AND (created_at < ");
            builder.push_bind(created_at);
            builder.push(" OR (created_at = ");
            builder.push_bind(created_at);
            builder.push(" AND id > ");
            builder.push_bind(id);
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC, id ASC LIMIT ");
        builder.push_bind(fetch_limit);

        let rows = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// Remove the descriptor and return it, so the caller learns the storage
    /// key of the blob it now owns cleaning up.
    pub async fn delete(&self, id: Uuid) -> RepoResult<ImageDescriptor> {
        sqlx::query_as::<_, ImageDescriptor>(&format!(
            "DELETE FROM images WHERE id = ? RETURNING {DESCRIPTOR_COLUMNS}"
        ))
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(not_found_or_sqlx)
    }

    /// Replace the signed-URL cache and return the updated descriptor.
    pub async fn update_url_cache(
        &self,
        id: Uuid,
        url: &str,
        expires_at: DateTime<Utc>,
    ) -> RepoResult<ImageDescriptor> {
        sqlx::query_as::<_, ImageDescriptor>(&format!(
            "UPDATE images SET public_url = ?, public_url_expires_at = ? WHERE id = ? \
             RETURNING {DESCRIPTOR_COLUMNS}"
        ))
        .bind(url)
        .bind(expires_at)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(not_found_or_sqlx)
    }

    /// Flip the visibility flag and return the updated descriptor.
    pub async fn update_visibility(
        &self,
        id: Uuid,
        is_public: bool,
    ) -> RepoResult<ImageDescriptor> {
        sqlx::query_as::<_, ImageDescriptor>(&format!(
            "UPDATE images SET is_public = ? WHERE id = ? RETURNING {DESCRIPTOR_COLUMNS}"
        ))
        .bind(is_public)
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(not_found_or_sqlx)
    }

    /// Lightweight connectivity probe for the readiness endpoint.
    pub async fn ping(&self) -> RepoResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

fn not_found_or_sqlx(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        other => RepoError::Sqlx(other),
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn repo() -> ImageRepository {
        let pool = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap(),
        );
        crate::db::run_migrations(&pool).await.unwrap();
        ImageRepository::new(pool)
    }

    fn descriptor(key: &str, created_at: DateTime<Utc>) -> ImageDescriptor {
        ImageDescriptor {
            id: Uuid::new_v4(),
            storage_key: key.to_string(),
            content_type: "image/png".into(),
            size_bytes: 4,
            is_public: false,
            folder: None,
            public_url: None,
            public_url_expires_at: None,
            created_at,
        }
    }

    #[tokio::test]
    async fn put_then_get_by_id_and_key() {
        let repo = repo().await;
        let desc = descriptor("a.png", Utc::now());
        repo.put(&desc).await.unwrap();

        let by_id = repo.get(desc.id).await.unwrap();
        assert_eq!(by_id.storage_key, "a.png");

        let by_key = repo.get_by_key("a.png").await.unwrap();
        assert_eq!(by_key.id, desc.id);

        assert!(matches!(
            repo.get(Uuid::new_v4()).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.get_by_key("missing").await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_id_or_key_is_a_conflict() {
        let repo = repo().await;
        let desc = descriptor("dup.png", Utc::now());
        repo.put(&desc).await.unwrap();

        // Same id, different key.
        let mut same_id = descriptor("other.png", Utc::now());
        same_id.id = desc.id;
        assert!(matches!(repo.put(&same_id).await, Err(RepoError::Conflict)));

        // Same key, different id.
        let same_key = descriptor("dup.png", Utc::now());
        assert!(matches!(
            repo.put(&same_key).await,
            Err(RepoError::Conflict)
        ));
    }

    #[tokio::test]
    async fn url_cache_and_visibility_updates() {
        let repo = repo().await;
        let desc = descriptor("u.png", Utc::now());
        repo.put(&desc).await.unwrap();

        let expires = Utc::now() + chrono::Duration::minutes(15);
        let updated = repo
            .update_url_cache(desc.id, "https://signed.example/u.png", expires)
            .await
            .unwrap();
        assert_eq!(
            updated.public_url.as_deref(),
            Some("https://signed.example/u.png")
        );
        assert_eq!(updated.public_url_expires_at, Some(expires));

        let flipped = repo.update_visibility(desc.id, true).await.unwrap();
        assert!(flipped.is_public);

        assert!(matches!(
            repo.update_url_cache(Uuid::new_v4(), "x", expires).await,
            Err(RepoError::NotFound)
        ));
        assert!(matches!(
            repo.update_visibility(Uuid::new_v4(), true).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn delete_returns_the_removed_descriptor() {
        let repo = repo().await;
        let desc = descriptor("d.png", Utc::now());
        repo.put(&desc).await.unwrap();

        let removed = repo.delete(desc.id).await.unwrap();
        assert_eq!(removed.storage_key, "d.png");
        assert!(matches!(repo.get(desc.id).await, Err(RepoError::NotFound)));
        assert!(matches!(
            repo.delete(desc.id).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_pages_through_keyset_positions() {
        let repo = repo().await;
        let base = Utc::now();
        for i in 0..5 {
            let mut desc = descriptor(&format!("k{i}.png"), base - chrono::Duration::seconds(i));
            desc.folder = Some(if i < 3 { "a".into() } else { "b".into() });
            repo.put(&desc).await.unwrap();
        }

        let all = repo.list(&ListFilter::default(), None, 10).await.unwrap();
        assert_eq!(all.len(), 5);
        // Newest first.
        assert_eq!(all[0].storage_key, "k0.png");
        assert_eq!(all[4].storage_key, "k4.png");

        let first_page = repo.list(&ListFilter::default(), None, 2).await.unwrap();
        assert_eq!(first_page.len(), 2);
        let last = &first_page[1];
        let second_page = repo
            .list(&ListFilter::default(), Some((last.created_at, last.id)), 2)
            .await
            .unwrap();
        assert_eq!(second_page.len(), 2);
        assert_eq!(second_page[0].storage_key, "k2.png");

        let folder_a = repo
            .list(
                &ListFilter {
                    folder: Some("a".into()),
                    is_public: None,
                },
                None,
                10,
            )
            .await
            .unwrap();
        assert_eq!(folder_a.len(), 3);
    }
}
