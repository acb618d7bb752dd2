//! Shared handles carried by the router.

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{services::image_service::ImageService, store::ObjectStore};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ImageService>,
    pub store: Arc<dyn ObjectStore>,
    pub db: Arc<SqlitePool>,
}
