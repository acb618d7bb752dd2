//! HTTP handlers for the image API.
//! Translates multipart/query/path input into ImageService calls; every
//! invariant is enforced in the service, not here.

use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    errors::AppError, models::image::ImageDescriptor, repository::image_repository::ListFilter,
    state::AppState,
};

/// Query params accepted by the list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListImagesQuery {
    pub folder: Option<String>,
    pub is_public: Option<bool>,
    pub cursor: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListImagesResponse {
    pub images: Vec<ImageDescriptor>,
    pub next_cursor: Option<String>,
}

/// Request body for `PUT /api/v1/images/{id}/visibility`.
#[derive(Debug, Deserialize)]
pub struct SetVisibilityReq {
    pub is_public: bool,
}

/// POST `/api/v1/images/upload` — multipart fields `file` (required),
/// `is_public`, `folder`.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file: Option<(Bytes, String)> = None;
    let mut is_public = false;
    let mut folder: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {err}")))?
    {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_default();
                let bytes = field.bytes().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read file field: {err}"))
                })?;
                file = Some((bytes, content_type));
            }
            Some("is_public") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read is_public field: {err}"))
                })?;
                is_public = match value.trim() {
                    "true" | "1" | "yes" => true,
                    "false" | "0" | "no" | "" => false,
                    other => {
                        return Err(AppError::bad_request(format!(
                            "invalid is_public value `{other}`"
                        )));
                    }
                };
            }
            Some("folder") => {
                let value = field.text().await.map_err(|err| {
                    AppError::bad_request(format!("failed to read folder field: {err}"))
                })?;
                if !value.is_empty() {
                    folder = Some(value);
                }
            }
            _ => {}
        }
    }

    let (bytes, content_type) =
        file.ok_or_else(|| AppError::bad_request("missing `file` field"))?;
    let descriptor = state
        .service
        .upload(bytes, &content_type, is_public, folder)
        .await?;

    Ok((StatusCode::CREATED, Json(descriptor)))
}

/// GET `/api/v1/images/{id}`
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = state.service.get(id).await?;
    Ok(Json(descriptor))
}

/// GET `/api/v1/images/public/{*key}` — wildcard so keys with a folder
/// prefix resolve.
pub async fn get_public_image(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = state.service.get_by_public_key(&key).await?;
    Ok(Json(descriptor))
}

/// GET `/api/v1/images/` — paginated listing, newest first.
pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<ListImagesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListFilter {
        folder: query.folder,
        is_public: query.is_public,
    };
    let page = state
        .service
        .list(filter, query.cursor.as_deref(), query.limit)
        .await?;

    Ok(Json(ListImagesResponse {
        images: page.images,
        next_cursor: page.next_cursor,
    }))
}

/// PUT `/api/v1/images/{id}/refresh` — unconditionally re-issue the signed
/// URL.
pub async fn refresh_image_url(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = state.service.refresh_url(id).await?;
    Ok(Json(descriptor))
}

/// PUT `/api/v1/images/{id}/visibility`
pub async fn set_image_visibility(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetVisibilityReq>,
) -> Result<impl IntoResponse, AppError> {
    let descriptor = state.service.set_visibility(id, req.is_public).await?;
    Ok(Json(descriptor))
}

/// DELETE `/api/v1/images/{id}`
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
