use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::models::ErrorResponse;
use crate::handler::DispatchError;
use crate::packages::PackageError;
use crate::server::ServerError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("payload invalid: {0}")]
    InvalidPayload(String),
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidPayload(_) => "INVALID_PAYLOAD",
            ApiError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };

        (status, Json(json!(body))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(value: serde_json::Error) -> Self {
        ApiError::InvalidPayload(value.to_string())
    }
}

impl From<ServerError> for ApiError {
    fn from(value: ServerError) -> Self {
        match value {
            ServerError::Package(err) => err.into(),
            ServerError::Dispatch(err) => err.into(),
        }
    }
}

impl From<PackageError> for ApiError {
    fn from(value: PackageError) -> Self {
        match value {
            PackageError::NotFound(_) => ApiError::NotFound(value.to_string()),
            PackageError::Io(err) => ApiError::Internal(err.to_string()),
            PackageError::PackageTooLarge(bytes) => ApiError::PayloadTooLarge(bytes as usize),
            // InvalidPackageName, PackageCorrupt, UnsafePackagePath
            other => ApiError::InvalidPayload(other.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::HandlerNotFound(_)
            | DispatchError::PackageNotFound(_)
            | DispatchError::HandlerTypeNotFound { .. }
            | DispatchError::UnknownJob(_) => ApiError::NotFound(value.to_string()),
            DispatchError::InvalidTransition { .. } | DispatchError::HandlerBusy => {
                ApiError::Conflict(value.to_string())
            }
            DispatchError::InvalidJobScript(_) => ApiError::InvalidPayload(value.to_string()),
        }
    }
}
