//! Route table for the image API.
//!
//! ## Structure
//! - **Health endpoints**
//!   - `GET    /health` — liveness
//!   - `GET    /readyz` — readiness (SQLite + object store)
//!
//! - **Image endpoints** (under `/api/v1/images`)
//!   - `POST   /upload` — multipart upload
//!   - `GET    /` — paginated list (folder/is_public filters, cursor)
//!   - `GET    /public/{*key}` — public fetch by storage key
//!   - `GET    /{id}` — fetch by id
//!   - `PUT    /{id}/refresh` — re-issue the signed URL
//!   - `PUT    /{id}/visibility` — flip the public flag
//!   - `DELETE /{id}` — delete metadata, then blob
//!
//! The wildcard `*key` allows keys with a folder prefix like
//! `avatars/7f6e...c1.jpg`.

use crate::{
    handlers::{
        health_handlers::{health, readyz},
        image_handlers::{
            delete_image, get_image, get_public_image, list_images, refresh_image_url,
            set_image_visibility, upload_image,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for all image API routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        // image endpoints
        .route("/api/v1/images/upload", post(upload_image))
        .route("/api/v1/images", get(list_images))
        .route("/api/v1/images/", get(list_images))
        .route("/api/v1/images/public/{*key}", get(get_public_image))
        .route("/api/v1/images/{id}", get(get_image).delete(delete_image))
        .route("/api/v1/images/{id}/refresh", put(refresh_image_url))
        .route("/api/v1/images/{id}/visibility", put(set_image_visibility))
}
