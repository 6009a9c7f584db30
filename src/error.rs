//! Protocol errors as values
//!
//! RFC 6749 error codes carried as a typed `{status, error, error_description}`
//! record. Handlers build these during validation and the endpoint boundary is
//! the single place they become HTTP responses. Persistence and signing
//! failures collapse to `server_error`; their cause is logged server-side and
//! never leaks into the body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::jwt::JwtError;
use crate::store::StoreError;

/// Error response body per RFC 6749 Section 5.2
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub error_description: String,
}

/// A protocol error bound to the HTTP status class it must produce.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub status: StatusCode,
    pub error: &'static str,
    pub description: String,
}

impl ProtocolError {
    fn new(status: StatusCode, error: &'static str, description: impl Into<String>) -> Self {
        Self {
            status,
            error,
            description: description.into(),
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "invalid_client", description)
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
    }

    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "unauthorized_client", description)
    }

    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            description,
        )
    }

    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_scope", description)
    }

    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "access_denied", description)
    }

    pub fn server_error() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "server_error",
            "internal server error",
        )
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            error: self.error.to_string(),
            error_description: self.description.clone(),
        }
    }
}

impl IntoResponse for ProtocolError {
    fn into_response(self) -> Response {
        let body = self.body();
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ProtocolError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "entity store failure");
        Self::server_error()
    }
}

impl From<JwtError> for ProtocolError {
    fn from(e: JwtError) -> Self {
        tracing::error!(error = %e, "token signing failure");
        Self::server_error()
    }
}
