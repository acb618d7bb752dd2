use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::services::image_service::ImageError;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

/// Translate service errors to HTTP statuses. Internal details stay in the
/// logs; clients get a stable message per class.
impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::InvalidInput(msg) => AppError::bad_request(msg),
            ImageError::NotFound => AppError::not_found("image not found"),
            ImageError::Forbidden => AppError::new(StatusCode::FORBIDDEN, "image is not public"),
            ImageError::Conflict => AppError::new(StatusCode::CONFLICT, "image already exists"),
            ImageError::StoreUnavailable(msg) => {
                tracing::error!("storage dependency unavailable: {}", msg);
                AppError::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "storage temporarily unavailable",
                )
            }
            ImageError::PartialFailure => AppError::internal("internal server error"),
        }
    }
}
