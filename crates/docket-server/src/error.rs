//! API error responses.
//!
//! Every failure leaves the server as
//! `{"error": {"kind": "...", "message": "...", "details": [...]}}`, where `kind` is
//! the stable machine name and `details` lists field errors of a validation failure.

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use docket_core::BrokerError;
use docket_core::domain::{ErrorKind, FieldError};
use serde::Serialize;

/// Error payload detail.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

/// Error response wrapper.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Malformed body, query string or path.
    #[error("{0}")]
    BadRequest(String),

    #[error("request timed out")]
    Timeout,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Broker(err) => match err.kind() {
                ErrorKind::TypeNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::TypeInactive | ErrorKind::NotClaimed => StatusCode::CONFLICT,
                ErrorKind::NotOwner => StatusCode::FORBIDDEN,
                ErrorKind::ValidationError => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::InvalidSortField => StatusCode::BAD_REQUEST,
                ErrorKind::StoreConflict => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Store => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Broker(err) => err.kind().as_str(),
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Timeout => "timeout",
        }
    }

    fn payload(&self) -> ErrorResponse {
        let details = match self {
            ApiError::Broker(err) => err.field_errors().to_vec(),
            _ => Vec::new(),
        };
        ErrorResponse {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message: self.to_string(),
                details,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "request failed");
        } else {
            tracing::debug!(kind = self.kind(), error = %self, "request rejected");
        }
        (status, Json(self.payload())).into_response()
    }
}
