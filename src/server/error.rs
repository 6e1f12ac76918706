//! Error responses for the HTTP service.

use crate::config::InvalidDpi;
use crate::error::{ErrorKind, FlattenError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Everything a request can fail with.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error(transparent)]
    InvalidDpi(#[from] InvalidDpi),

    /// The request body could not be read (size limit, broken stream, ...).
    #[error("{message}")]
    Body { status: StatusCode, message: String },

    #[error(transparent)]
    Flatten(#[from] FlattenError),

    #[error("Flatten timed out after {0}s")]
    Timeout(u64),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::InvalidDpi(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_DPI"),
            ApiError::Body { status, .. } if *status == StatusCode::PAYLOAD_TOO_LARGE => {
                (*status, "PAYLOAD_TOO_LARGE")
            }
            ApiError::Body { status, .. } => (*status, "INVALID_BODY"),
            ApiError::Flatten(e) => match e.kind() {
                ErrorKind::InvalidInput => (StatusCode::BAD_REQUEST, "INVALID_PDF"),
                ErrorKind::RenderFailure => (StatusCode::UNPROCESSABLE_ENTITY, "RENDER_FAILED"),
                ErrorKind::SerializationFailure => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_FAILED")
                }
                ErrorKind::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Internal details stay in the log; callers get a generic message.
        let message = if status.is_server_error() {
            error!(code, "Request failed: {}", self);
            match &self {
                ApiError::Timeout(_) => self.to_string(),
                _ => "Internal error while flattening the document".to_string(),
            }
        } else {
            warn!(code, "Request rejected: {}", self);
            self.to_string()
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
        };

        (status, Json(body)).into_response()
    }
}
