//! Shared harness: in-memory SQLite pool, in-memory object store, and the
//! real router driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use http_body_util::BodyExt;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tower::ServiceExt;

use image_store::{
    config::UploadLimits,
    db,
    repository::image_repository::ImageRepository,
    routes,
    services::image_service::ImageService,
    state::AppState,
    store::{ObjectStore, memory::MemoryObjectStore},
};

pub const URL_TTL: Duration = Duration::from_secs(15 * 60);
pub const BOUNDARY: &str = "image-store-test-boundary";

pub struct TestContext {
    pub router: Router,
    pub service: Arc<ImageService>,
    pub repo: ImageRepository,
    pub store: Arc<MemoryObjectStore>,
    pub db: Arc<SqlitePool>,
}

impl TestContext {
    pub async fn new() -> Self {
        let pool = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .expect("in-memory sqlite pool"),
        );
        db::run_migrations(&pool).await.expect("migrations");

        let store = Arc::new(MemoryObjectStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let repo = ImageRepository::new(pool.clone());
        let service = Arc::new(ImageService::new(
            repo.clone(),
            store_dyn.clone(),
            UploadLimits::default(),
            URL_TTL,
        ));

        let state = AppState {
            service: service.clone(),
            store: store_dyn,
            db: pool.clone(),
        };
        let router = routes::routes::routes().with_state(state);

        Self {
            router,
            service,
            repo,
            store,
            db: pool,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .method("GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn put_json(&self, uri: &str, payload: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .method("PUT")
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_multipart(&self, uri: &str, body: Vec<u8>) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .method("POST")
                .header(
                    "Content-Type",
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Upload through the HTTP surface and return the descriptor JSON.
    pub async fn upload(
        &self,
        bytes: &[u8],
        content_type: &str,
        is_public: bool,
        folder: Option<&str>,
    ) -> serde_json::Value {
        let body = multipart_body(
            Some((bytes, content_type)),
            Some(if is_public { "true" } else { "false" }),
            folder,
        );
        let response = self.post_multipart("/api/v1/images/upload", body).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        parse_body(response).await
    }
}

/// Hand-rolled multipart body; every part is optional so malformed uploads
/// can be expressed too.
pub fn multipart_body(
    file: Option<(&[u8], &str)>,
    is_public: Option<&str>,
    folder: Option<&str>,
) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((bytes, content_type)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; \
                 filename=\"upload.bin\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in [("is_public", is_public), ("folder", folder)] {
        if let Some(value) = value {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; \
                     name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn parse_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}
