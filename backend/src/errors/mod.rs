//! Global application error types.
//!
//! This module defines the error taxonomy shared by the authentication core and
//! the HTTP layer. Every variant maps to exactly one machine-readable code and
//! status (see `api::common::service_error_to_http`).

use thiserror::Error;

/// Why a request failed authentication at the middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No `Authorization: Bearer` header.
    MissingToken,
    /// Bad signature, expired, malformed or wrong token type.
    InvalidToken,
    /// Token verified but its session is no longer in the cache.
    SessionExpired,
}

impl AuthFailure {
    pub fn code(self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "AUTHENTICATION_ERROR",
            AuthFailure::InvalidToken => "INVALID_TOKEN",
            AuthFailure::SessionExpired => "SESSION_EXPIRED",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "Authentication required",
            AuthFailure::InvalidToken => "Invalid or expired token",
            AuthFailure::SessionExpired => "Session expired or invalid",
        }
    }
}

/// Generic service error that can be used across all entities
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Unknown identity or wrong password. Deliberately one variant.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid second factor code")]
    InvalidMfaCode,

    #[error("Authentication failed: {}", kind.message())]
    Authentication { kind: AuthFailure },

    #[error("Account locked")]
    AccountLocked,

    #[error("Account inactive")]
    AccountInactive,

    #[error("Company suspended")]
    CompanySuspended,

    #[error("IP address not allowed")]
    UnauthorizedIp,

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    #[error("Database error: {source}")]
    Database {
        #[from]
        source: anyhow::Error,
    },

    #[error("Session cache error: {message}")]
    Cache { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    // Helper constructors for common patterns

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn authentication(kind: AuthFailure) -> Self {
        Self::Authentication { kind }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            identifier: identifier.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Flattens `validator` output into a single `field: message` list.
    pub fn from_validation_errors(errors: &validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    format!(
                        "{}: {}",
                        field,
                        error.message.as_ref().unwrap_or(&"Invalid value".into())
                    )
                })
            })
            .collect();
        messages.sort();
        Self::validation(messages.join(", "))
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(error: redis::RedisError) -> Self {
        Self::cache(error.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        Self::cache(format!("session record serialization failed: {}", error))
    }
}
