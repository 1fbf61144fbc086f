//! Error types for LinguaChat services
//!
//! Provides a comprehensive error handling system with:
//! - Distinct error types for different failure modes
//! - HTTP status code mapping
//! - Structured error responses
//! - Error codes for client handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Authentication errors (2xxx)
    Unauthorized,
    InvalidCredential,
    ExpiredCredential,
    IdentityUnresolvable,
    LoginUnavailable,

    // Authorization errors (3xxx)
    Forbidden,

    // Resource errors (4xxx)
    SessionNotFound,

    // Rate limiting (6xxx)
    RateLimited,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,
    PersistenceUnavailable,

    // External service errors (8xxx)
    ModelError,
    ModelTimeout,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,

    // Service unavailable
    ServiceUnavailable,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,

            // Auth (2xxx)
            ErrorCode::Unauthorized => 2001,
            ErrorCode::InvalidCredential => 2002,
            ErrorCode::ExpiredCredential => 2003,
            ErrorCode::IdentityUnresolvable => 2004,
            ErrorCode::LoginUnavailable => 2005,

            // Authz (3xxx)
            ErrorCode::Forbidden => 3001,

            // Resources (4xxx)
            ErrorCode::SessionNotFound => 4002,

            // Rate limits (6xxx)
            ErrorCode::RateLimited => 6001,

            // Database (7xxx)
            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,
            ErrorCode::PersistenceUnavailable => 7003,

            // External (8xxx)
            ErrorCode::ModelError => 8002,
            ErrorCode::ModelTimeout => 8003,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,

            ErrorCode::ServiceUnavailable => 9999,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Invalid identity credential")]
    InvalidCredential,

    #[error("Identity credential expired")]
    ExpiredCredential,

    #[error("Identity has no stable subject id; login rejected")]
    IdentityUnresolvable,

    #[error("Login unavailable: {message}")]
    LoginUnavailable { message: String },

    // Authorization errors
    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    // Resource errors
    #[error("Session not found: {id}")]
    SessionNotFound { id: String },

    // Rate limiting
    #[error("Rate limit exceeded: {limit} requests per second")]
    RateLimited { limit: u32 },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Persistence backend not configured")]
    PersistenceUnavailable,

    // External service errors
    #[error("Model request failed: {message}")]
    ModelError { message: String },

    #[error("Model request timed out after {timeout_ms}ms")]
    ModelTimeout { timeout_ms: u64 },

    // Internal errors
    #[error("Internal server error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::InvalidCredential => ErrorCode::InvalidCredential,
            AppError::ExpiredCredential => ErrorCode::ExpiredCredential,
            AppError::IdentityUnresolvable => ErrorCode::IdentityUnresolvable,
            AppError::LoginUnavailable { .. } => ErrorCode::LoginUnavailable,
            AppError::Forbidden { .. } => ErrorCode::Forbidden,
            AppError::SessionNotFound { .. } => ErrorCode::SessionNotFound,
            AppError::RateLimited { .. } => ErrorCode::RateLimited,
            AppError::Database(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::PersistenceUnavailable => ErrorCode::PersistenceUnavailable,
            AppError::ModelError { .. } => ErrorCode::ModelError,
            AppError::ModelTimeout { .. } => ErrorCode::ModelTimeout,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            AppError::Unauthorized { .. }
            | AppError::InvalidCredential
            | AppError::ExpiredCredential => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            AppError::Forbidden { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 422 Unprocessable Entity
            AppError::IdentityUnresolvable => StatusCode::UNPROCESSABLE_ENTITY,

            // 429 Too Many Requests
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 500 Internal Server Error
            AppError::Database(_)
            | AppError::DatabaseConnection { .. }
            | AppError::Internal { .. }
            | AppError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,

            // 502 Bad Gateway
            AppError::ModelError { .. } => StatusCode::BAD_GATEWAY,

            // 503 Service Unavailable
            AppError::LoginUnavailable { .. }
            | AppError::PersistenceUnavailable
            | AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            AppError::ModelTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Check if this error should be logged at error level
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Check if this error is a client error
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

/// Structured error response for API
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let message = self.to_string();

        // Log based on severity
        if self.is_server_error() {
            tracing::error!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Server error"
            );
        } else if self.is_client_error() {
            tracing::warn!(
                error = %message,
                code = ?code,
                status = status.as_u16(),
                "Client error"
            );
        }

        let details = match &self {
            AppError::Validation { field: Some(field), .. } => {
                Some(serde_json::json!({ "field": field }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: ErrorDetails {
                code,
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::SessionNotFound { id: "test".into() };
        assert_eq!(err.code(), ErrorCode::SessionNotFound);
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_validation_error() {
        let err = AppError::Validation {
            message: "Message text is empty".into(),
            field: Some("text".into()),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(!err.is_server_error());
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unresolvable_identity_is_client_error() {
        let err = AppError::IdentityUnresolvable;
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code().as_code(), 2004);
        assert!(err.is_client_error());
    }

    #[test]
    fn test_error_codes_are_unique() {
        let errors = [
            AppError::Validation { message: "x".into(), field: None },
            AppError::Unauthorized { message: "x".into() },
            AppError::InvalidCredential,
            AppError::ExpiredCredential,
            AppError::IdentityUnresolvable,
            AppError::LoginUnavailable { message: "x".into() },
            AppError::Forbidden { message: "x".into() },
            AppError::SessionNotFound { id: "x".into() },
            AppError::RateLimited { limit: 1 },
            AppError::DatabaseConnection { message: "x".into() },
            AppError::PersistenceUnavailable,
            AppError::ModelError { message: "x".into() },
            AppError::ModelTimeout { timeout_ms: 1 },
            AppError::Internal { message: "x".into() },
            AppError::Configuration { message: "x".into() },
            AppError::ServiceUnavailable { message: "x".into() },
        ];

        let mut codes: Vec<u16> = errors.iter().map(|e| e.code().as_code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_model_timeout_message() {
        let err = AppError::ModelTimeout { timeout_ms: 30_000 };
        assert_eq!(err.to_string(), "Model request timed out after 30000ms");
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(err.is_server_error());
    }
}
