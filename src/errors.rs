use crate::services::{object_store::StorageError, remote_fetch::FetchError};
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures of a gateway operation. Every variant maps to one HTTP status.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    UpstreamFetchFailure(String),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) | GatewayError::UpstreamFetchFailure(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidObjectKey => GatewayError::BadRequest("Invalid object key".into()),
            StorageError::Io(io) => {
                if let Some(fetch) = FetchError::from_io(&io) {
                    GatewayError::UpstreamFetchFailure(fetch.to_string())
                } else if let Some(form) = io
                    .get_ref()
                    .and_then(|e| e.downcast_ref::<MultipartError>())
                {
                    GatewayError::BadRequest(form.body_text())
                } else {
                    GatewayError::Internal(io.to_string())
                }
            }
            StorageError::Sqlx(db) => GatewayError::Internal(db.to_string()),
        }
    }
}

impl From<FetchError> for GatewayError {
    fn from(err: FetchError) -> Self {
        GatewayError::UpstreamFetchFailure(err.to_string())
    }
}

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

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::new(err.status(), err.to_string())
    }
}
