//! Gateway error type.
//!
//! One enum maps to both transports: `tonic::Code` on gRPC,
//! `StatusCode` on HTTP (axum). Internals are never echoed to the caller —
//! each variant carries a fixed, user-visible message (§7); anything that
//! isn't one of these kinds collapses to `Internal`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub const INTERNAL_SERVER_ERROR: &str = "An unexpected error occurred while processing your request";
pub const SIGNATURE_VERIFICATION_ERROR: &str = "Signature verification failed. Please try again";
pub const UNAUTHORIZED_ACCESS_ERROR: &str =
    "Authorization failed. Please verify your credentials and try again";
pub const RATE_LIMIT_EXCEEDED_ERROR: &str = "Slow down. Too many requests. Try again shortly";
pub const MISSING_X_FORWARDED_FOR_ERROR: &str =
    "X-Forwarded-For header is required for accurate processing";

/// One invalid field, collected rather than short-circuiting on the first
/// violation (§7's field-violation aggregation).
#[derive(Debug, Clone, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub description: String,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid parameters")]
    InvalidArgument(Vec<FieldViolation>),

    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    PermissionDenied(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    ResourceExhausted(&'static str),

    #[error("{0}")]
    Internal(&'static str),
}

impl GatewayError {
    pub fn invalid_argument(field: impl Into<String>, description: impl Into<String>) -> Self {
        Self::InvalidArgument(vec![FieldViolation {
            field: field.into(),
            description: description.into(),
        }])
    }

    pub fn internal() -> Self {
        Self::Internal(INTERNAL_SERVER_ERROR)
    }

    pub fn unauthorized() -> Self {
        Self::PermissionDenied(UNAUTHORIZED_ACCESS_ERROR)
    }

    pub fn unauthenticated() -> Self {
        Self::Unauthenticated(UNAUTHORIZED_ACCESS_ERROR)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<FieldViolation>,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, message, violations) = match self {
            GatewayError::InvalidArgument(v) => (StatusCode::BAD_REQUEST, "invalid parameters".to_string(), v),
            GatewayError::Unauthenticated(m) => (StatusCode::UNAUTHORIZED, m.to_string(), vec![]),
            GatewayError::PermissionDenied(m) => (StatusCode::FORBIDDEN, m.to_string(), vec![]),
            GatewayError::NotFound(m) => (StatusCode::NOT_FOUND, m.to_string(), vec![]),
            GatewayError::ResourceExhausted(m) => (StatusCode::TOO_MANY_REQUESTS, m.to_string(), vec![]),
            GatewayError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.to_string(), vec![]),
        };

        let body = ErrorBody {
            code: status.as_u16(),
            message,
            violations,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<GatewayError> for tonic::Status {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidArgument(_) => tonic::Status::invalid_argument("invalid parameters"),
            GatewayError::Unauthenticated(m) => tonic::Status::unauthenticated(m),
            GatewayError::PermissionDenied(m) => tonic::Status::permission_denied(m),
            GatewayError::NotFound(m) => tonic::Status::not_found(m),
            GatewayError::ResourceExhausted(m) => tonic::Status::resource_exhausted(m),
            GatewayError::Internal(m) => tonic::Status::internal(m),
        }
    }
}
