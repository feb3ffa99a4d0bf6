//! Error types for the board functions crate.

use thiserror::Error;
use tokenboard_core::{RemoteCallError, RemoteErrorKind};

/// Result type alias for board function operations.
pub type Result<T> = std::result::Result<T, FunctionsError>;

/// Retry policy class for API failures.
///
/// The sync engine never retries a rejected action; the class drives the
/// listener's backoff and is reported in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Errors that can occur when talking to the board functions.
#[derive(Debug, Error)]
pub enum FunctionsError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success HTTP response without a callable error body
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Error reported by a callable function (`{"error": {"status", "message"}}`)
    #[error("Function error ({status}): {message}")]
    Callable { status: String, message: String },

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Authentication error (missing or invalid token)
    #[error("Authentication error: {0}")]
    Auth(String),
}

impl FunctionsError {
    /// Create an API error from status and message
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a callable function error
    pub fn callable(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Callable {
            status: status.into(),
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// HTTP status if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 423 | 425 | 429 => ApiRetryClass::Retryable,
                500..=599 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Callable { status, .. } => match RemoteErrorKind::from_status(status) {
                RemoteErrorKind::Unauthenticated => ApiRetryClass::ReauthRequired,
                RemoteErrorKind::Unavailable => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) => ApiRetryClass::Permanent,
            Self::InvalidRequest(_) => ApiRetryClass::Permanent,
            Self::Auth(_) => ApiRetryClass::ReauthRequired,
        }
    }

    /// Remote error taxonomy understood by the core crate.
    pub fn remote_kind(&self) -> RemoteErrorKind {
        match self {
            Self::Callable { status, .. } => RemoteErrorKind::from_status(status),
            Self::Api { status, .. } => match *status {
                401 => RemoteErrorKind::Unauthenticated,
                403 => RemoteErrorKind::PermissionDenied,
                404 => RemoteErrorKind::NotFound,
                400 | 409 | 412 => RemoteErrorKind::FailedPrecondition,
                408 | 429 | 500..=599 => RemoteErrorKind::Unavailable,
                _ => RemoteErrorKind::Internal,
            },
            Self::Http(_) => RemoteErrorKind::Unavailable,
            Self::Auth(_) => RemoteErrorKind::Unauthenticated,
            Self::Json(_) | Self::InvalidRequest(_) => RemoteErrorKind::Internal,
        }
    }
}

impl From<FunctionsError> for RemoteCallError {
    fn from(err: FunctionsError) -> Self {
        let kind = err.remote_kind();
        let message = match err {
            FunctionsError::Callable { message, .. } => message,
            FunctionsError::Api { message, .. } => message,
            other => other.to_string(),
        };
        RemoteCallError::new(kind, message)
    }
}

impl From<FunctionsError> for tokenboard_core::Error {
    fn from(err: FunctionsError) -> Self {
        tokenboard_core::Error::Remote(err.into())
    }
}
