//! HTTP error types for the `semverd` server.
//!
//! Maps [`ServiceError`]s into HTTP responses. The JSON and XML forms carry
//! a machine-readable `error` field and a human-readable `message`; the plain
//! text form is the message alone.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::service::ServiceError;
use crate::xml::Xml;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// Requested project not found.
    NotFound(String),
    /// Client sent an invalid id or version.
    BadRequest(String),
    /// Storage failure.
    Internal(String),
}

/// JSON and XML error response body.
#[derive(Serialize)]
#[serde(rename = "error")]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl AppError {
    fn parts(self) -> (StatusCode, &'static str, String) {
        match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        }
    }

    /// Plain-text response: status code and message only.
    pub fn into_text_response(self) -> Response {
        let (status, _, message) = self.parts();
        (status, message).into_response()
    }

    /// XML response carrying the same fields as the JSON body.
    pub fn into_xml_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, Xml(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = self.parts();
        let body = ErrorBody {
            error: error_type,
            message,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidUuid { .. } | ServiceError::InvalidVersion { .. } => {
                Self::BadRequest(err.to_string())
            }
            ServiceError::ProjectNotFound { .. } => Self::NotFound(err.to_string()),
            ServiceError::Storage(ref inner) if inner.is_not_found() => {
                Self::NotFound(err.to_string())
            }
            ServiceError::Storage(ref inner) => {
                error!(error = %inner, kind = ?inner.kind(), "storage operation failed");
                Self::Internal(err.to_string())
            }
        }
    }
}
