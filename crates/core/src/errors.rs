//! Error types for the core crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a rejected remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteErrorKind {
    /// Caller lacks board access or the required role.
    PermissionDenied,
    /// Caller is not signed in.
    Unauthenticated,
    /// Board or reward does not exist.
    NotFound,
    /// Server-side precondition failed (e.g. insufficient balance).
    FailedPrecondition,
    /// Network or service unavailable.
    Unavailable,
    Internal,
}

impl RemoteErrorKind {
    /// Map a callable-function status string (`"permission-denied"`,
    /// `"PERMISSION_DENIED"`, ...) to a kind.
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_lowercase().replace('_', "-").as_str() {
            "permission-denied" => Self::PermissionDenied,
            "unauthenticated" => Self::Unauthenticated,
            "not-found" => Self::NotFound,
            "failed-precondition" | "out-of-range" | "invalid-argument" => {
                Self::FailedPrecondition
            }
            "unavailable" | "deadline-exceeded" | "resource-exhausted" | "aborted" => {
                Self::Unavailable
            }
            _ => Self::Internal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "permission_denied",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::FailedPrecondition => "failed_precondition",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

/// A remote mutating call was rejected or could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({})", .kind.as_str())]
pub struct RemoteCallError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteCallError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, message)
    }

    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::FailedPrecondition, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }
}

/// Errors that can occur in the core crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A document delivered by the remote collaborator failed validation
    #[error("Invalid board document: {0}")]
    InvalidDocument(String),

    /// A remote mutating call was rejected
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteCallError),

    /// The document subscription could not be established
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Reading or writing a local preference failed
    #[error("Settings error: {0}")]
    Settings(String),

    /// Caller passed an argument that does not fit the current context
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument(message.into())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Short code used in diagnostics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDocument(_) => "invalid_document",
            Self::Remote(err) => err.kind.as_str(),
            Self::Subscription(_) => "subscription",
            Self::Settings(_) => "settings",
            Self::InvalidInput(_) => "invalid_input",
            Self::Json(_) => "json",
        }
    }
}
