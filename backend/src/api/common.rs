//! Error handling utilities for API responses.
//!
//! Provides the response envelope shared by every endpoint and the conversion
//! from service-layer errors to HTTP responses.
//!
//! # Response Format
//! Successful responses carry `success: true` and a `data` payload. Failures
//! carry `success: false` and an `error` object with:
//! - `code`: machine-readable error code (e.g. `INVALID_CREDENTIALS`)
//! - `message`: human-readable message
//!
//! # Error Handling Flow
//! 1. Service layer returns a domain-specific `ServiceError`
//! 2. `service_error_to_http` converts it to a status and envelope
//! 3. Internal failures are logged and replaced by a generic message

use crate::errors::ServiceError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};

/// Standard API response wrapper for all endpoints
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Indicates if the request was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error details (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    /// Response timestamp
    pub timestamp: String,
}

/// Error details for failed requests
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a successful response without a message
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create an error response
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            message: None,
            error: Some(ErrorDetails {
                code: code.into(),
                message: message.into(),
            }),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

/// Unwraps a JSON request body.
///
/// Malformed or incomplete bodies answer with the `VALIDATION_ERROR` envelope
/// instead of axum's plain-text rejection.
pub fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ErrorResponse> {
    match payload {
        Ok(Json(payload)) => Ok(payload),
        Err(rejection) => {
            tracing::debug!("Rejected request body: {}", rejection.body_text());
            Err(service_error_to_http(ServiceError::validation(
                rejection.body_text(),
            )))
        }
    }
}

/// Converts ServiceError to appropriate HTTP response with standard format
pub fn service_error_to_http(error: ServiceError) -> ErrorResponse {
    let (status, code, message) = match error {
        ServiceError::Validation { message } => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
        }
        ServiceError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "INVALID_CREDENTIALS",
            "Invalid email or password".to_string(),
        ),
        ServiceError::InvalidMfaCode => (
            StatusCode::UNAUTHORIZED,
            "INVALID_MFA_CODE",
            "Invalid second factor code".to_string(),
        ),
        ServiceError::Authentication { kind } => {
            (StatusCode::UNAUTHORIZED, kind.code(), kind.message().to_string())
        }
        ServiceError::AccountLocked => (
            StatusCode::FORBIDDEN,
            "ACCOUNT_LOCKED",
            "Account is locked. Contact your administrator".to_string(),
        ),
        ServiceError::AccountInactive => (
            StatusCode::FORBIDDEN,
            "ACCOUNT_INACTIVE",
            "Account is inactive".to_string(),
        ),
        ServiceError::CompanySuspended => (
            StatusCode::FORBIDDEN,
            "COMPANY_SUSPENDED",
            "Company account is suspended".to_string(),
        ),
        ServiceError::UnauthorizedIp => (
            StatusCode::FORBIDDEN,
            "UNAUTHORIZED_IP",
            "Login from this IP address is not allowed".to_string(),
        ),
        ServiceError::Forbidden { message } => (StatusCode::FORBIDDEN, "FORBIDDEN", message),
        ServiceError::NotFound { entity, identifier } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{} '{}' not found", entity, identifier),
        ),
        ServiceError::Database { source } => {
            tracing::error!("Database error: {:#}", source);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "Internal server error".to_string(),
            )
        }
        ServiceError::Cache { message } => {
            tracing::error!("Session cache error: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Internal server error".to_string(),
            )
        }
        ServiceError::InternalError { message } => {
            tracing::error!("Internal error: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "Internal server error".to_string(),
            )
        }
    };

    (status, Json(ApiResponse::<()>::error(code, message)))
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        service_error_to_http(self).into_response()
    }
}
