//! Error types for the ingest server.
//!
//! This module defines a unified error handling system using `thiserror`.
//! All errors are converted to appropriate HTTP responses automatically.
//!
//! # Error Categories
//!
//! - **Client errors (4xx)**: Invalid input, unknown sessions, state
//!   conflicts, integrity failures at finalisation
//! - **Server errors (5xx)**: I/O failures, session store errors, index
//!   corruption
//!
//! # Example
//!
//! ```rust,ignore
//! use crate::error::{AppError, Result};
//!
//! fn check_index(index: u64, total: u64) -> Result<()> {
//!     if index >= total {
//!         return Err(AppError::invalid_argument("chunkIndex out of range"));
//!     }
//!     Ok(())
//! }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
///
/// This enum represents all possible errors that can occur in the application.
/// Each variant is mapped to an appropriate HTTP status code.
#[derive(Debug, Error)]
pub enum AppError {
    // -------------------------------------------------------------------------
    // Client Errors (4xx)
    // -------------------------------------------------------------------------
    /// Malformed request: missing fields, out-of-range chunk index, bad values
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Upload metadata rejected at initiation; carries per-field detail lines
    #[error("Upload request failed validation")]
    InvalidMetadata(Vec<String>),

    /// Unknown session id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation incompatible with the session's current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Finalize requested before all chunks arrived
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Digest mismatch on the reassembled file
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// Byte signature does not match the declared media type
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// A required staged chunk is missing at finalisation time
    #[error("Data loss: {0}")]
    DataLoss(String),

    // -------------------------------------------------------------------------
    // Server Errors (5xx)
    // -------------------------------------------------------------------------
    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session store error
    #[error("Session store error: {0}")]
    Database(#[from] rocksdb::Error),
}

impl AppError {
    // -------------------------------------------------------------------------
    // Convenience constructors
    // -------------------------------------------------------------------------

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a failed precondition error
    pub fn failed_precondition<S: Into<String>>(msg: S) -> Self {
        Self::FailedPrecondition(msg.into())
    }

    /// Create an integrity error
    pub fn integrity<S: Into<String>>(msg: S) -> Self {
        Self::IntegrityError(msg.into())
    }

    /// Create an invalid content error
    pub fn invalid_content<S: Into<String>>(msg: S) -> Self {
        Self::InvalidContent(msg.into())
    }

    /// Create a data loss error
    pub fn data_loss<S: Into<String>>(msg: S) -> Self {
        Self::DataLoss(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::InvalidMetadata(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::FailedPrecondition(_) => StatusCode::BAD_REQUEST,
            Self::IntegrityError(_) => StatusCode::BAD_REQUEST,
            Self::InvalidContent(_) => StatusCode::BAD_REQUEST,
            Self::DataLoss(_) => StatusCode::BAD_REQUEST,

            // 5xx Server Errors
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Whether this error transitions a session to Failed during finalisation.
    ///
    /// Integrity, content-validation, and data-loss failures are terminal for
    /// the session; internal errors leave the session untouched so an
    /// operator can recover and the client can retry.
    pub fn fails_session(&self) -> bool {
        matches!(
            self,
            Self::IntegrityError(_) | Self::InvalidContent(_) | Self::DataLoss(_)
        )
    }
}

/// Error envelope sent to clients: `{success:false, error, errors?}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Always `false` on the error path
    pub success: bool,
    /// Human-readable one-line error message
    pub error: String,
    /// Optional per-field detail lines (metadata validation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl ErrorResponse {
    /// Create a new error response
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            errors: None,
        }
    }

    /// Attach detail lines to the response
    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.errors = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, "Server error occurred");
        } else {
            tracing::debug!(error = %self, "Client error occurred");
        }

        // For server errors, don't expose internal details to clients
        let message = if self.is_server_error() {
            "An internal error occurred. Please try again later.".to_string()
        } else {
            self.to_string()
        };

        let body = match self {
            Self::InvalidMetadata(details) => ErrorResponse::new(message).with_details(details),
            _ => ErrorResponse::new(message),
        };

        (status, Json(body)).into_response()
    }
}

// -------------------------------------------------------------------------
// Error conversions from external crates
// -------------------------------------------------------------------------

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization error: {}", err))
    }
}
