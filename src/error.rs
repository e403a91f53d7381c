/// Unified error types for Parlor
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum ParlorError {
    /// Missing or empty request fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown account or resource
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generation backend unreachable or returned malformed output
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Persistence transaction error
    #[error("Storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// Embedding or vector-search collaborator error
    #[error("Search failure: {0}")]
    Search(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Conflict errors (e.g., duplicate username)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// PDF parsing errors
    #[error("Invalid document: {0}")]
    Document(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// JWT errors
    #[error("JWT error: {0}")]
    Jwt(String),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// JSON error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ParlorError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            ParlorError::InvalidInput(_) => "InvalidInput",
            ParlorError::NotFound(_) => "NotFound",
            ParlorError::Upstream(_) => "UpstreamFailure",
            ParlorError::Storage(_) => "StorageFailure",
            ParlorError::Search(_) => "SearchFailure",
            ParlorError::Authentication(_) => "AuthenticationRequired",
            ParlorError::Conflict(_) => "Conflict",
            ParlorError::Document(_) => "InvalidDocument",
            ParlorError::RateLimitExceeded { .. } => "RateLimitExceeded",
            ParlorError::Jwt(_) | ParlorError::Internal(_) | ParlorError::Io(_) => {
                "InternalServerError"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ParlorError::InvalidInput(_) | ParlorError::Document(_) => StatusCode::BAD_REQUEST,
            ParlorError::NotFound(_) => StatusCode::NOT_FOUND,
            ParlorError::Authentication(_) => StatusCode::UNAUTHORIZED,
            ParlorError::Conflict(_) => StatusCode::CONFLICT,
            ParlorError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ParlorError::Upstream(_) | ParlorError::Search(_) => StatusCode::BAD_GATEWAY,
            ParlorError::Storage(_)
            | ParlorError::Jwt(_)
            | ParlorError::Internal(_)
            | ParlorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a client
    pub fn public_message(&self) -> String {
        match self {
            ParlorError::Storage(_) => "Storage failure".to_string(),
            ParlorError::Jwt(_) | ParlorError::Internal(_) | ParlorError::Io(_) => {
                "Internal server error".to_string() // Don't leak details
            }
            _ => self.to_string(),
        }
    }
}

/// Convert ParlorError to HTTP response
impl IntoResponse for ParlorError {
    fn into_response(self) -> Response {
        if self.status().is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.code().to_string(),
            message: self.public_message(),
        });

        let mut response = (self.status(), body).into_response();
        if let ParlorError::RateLimitExceeded { retry_after } = &self {
            // Whole seconds, rounded up
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

/// Result type alias for Parlor operations
pub type ParlorResult<T> = Result<T, ParlorError>;
