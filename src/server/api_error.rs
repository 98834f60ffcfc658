//! Standardized API error responses for the gateway endpoints.
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "NO_STORED_INSTANCE",
//!     "message": "no stored instance to deactivate"
//!   }
//! }
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;

/// Machine-readable error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Request Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A required field is missing
    MissingField,
    /// There is no activated instance on this machine
    NoStoredInstance,
    /// The remote license service refused the operation
    RemoteRejected,

    // === Resource Errors (404/409) ===
    /// No license has been activated on this machine
    LicenseNotFound,
    /// A license is already activated on this machine
    AlreadyActivated,

    // === Server Errors (5xx) ===
    /// Local record files could not be read or written
    StorageError,
    /// Encryption/decryption of the stored instance failed
    CryptoError,
    /// Server configuration error
    ConfigError,
    /// The remote license service was unreachable or answered garbage
    NetworkError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest
            | ErrorCode::MissingField
            | ErrorCode::NoStoredInstance
            | ErrorCode::RemoteRejected => StatusCode::BAD_REQUEST,

            ErrorCode::LicenseNotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyActivated => StatusCode::CONFLICT,

            ErrorCode::StorageError
            | ErrorCode::CryptoError
            | ErrorCode::ConfigError => StatusCode::INTERNAL_SERVER_ERROR,

            ErrorCode::NetworkError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::MissingField => "A required field is missing",
            ErrorCode::NoStoredInstance => "No stored instance to deactivate",
            ErrorCode::RemoteRejected => "The license service refused the request",
            ErrorCode::LicenseNotFound => "No license is activated on this machine",
            ErrorCode::AlreadyActivated => "A license is already activated on this machine",
            ErrorCode::StorageError => "Local license storage failed",
            ErrorCode::CryptoError => "Failed to decrypt instance ID",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::NetworkError => "Failed to communicate with the license service",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (field name, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with a custom message.
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    /// Missing required field error.
    pub fn missing_field(field: &str) -> Self {
        let mut err = Self::with_message(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        );
        err.error.details = Some(serde_json::json!({ "field": field }));
        err
    }

    /// Request body could not be decoded.
    pub fn invalid_request(reason: impl std::fmt::Display) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, format!("Invalid request: {reason}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let code = match &err {
            GatewayError::Transport { .. } | GatewayError::ResponseFormat(_) => {
                ErrorCode::NetworkError
            }
            GatewayError::RemoteBusiness(_) => ErrorCode::RemoteRejected,
            GatewayError::LocalState(_) | GatewayError::Encryption(_) => ErrorCode::CryptoError,
            GatewayError::AlreadyActivated => ErrorCode::AlreadyActivated,
            GatewayError::NoStoredInstance => ErrorCode::NoStoredInstance,
            GatewayError::NotFound => ErrorCode::LicenseNotFound,
            GatewayError::Format(_) | GatewayError::Storage(_) => ErrorCode::StorageError,
            GatewayError::Config(_) => ErrorCode::ConfigError,
        };
        ApiError::with_message(code, err.to_string())
    }
}
