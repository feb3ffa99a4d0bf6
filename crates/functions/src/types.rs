//! Callable function wire envelopes.

use serde::{Deserialize, Serialize};

/// Request envelope: `{ "data": ... }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableRequest<T> {
    pub data: T,
}

/// Error body returned by a callable function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableErrorBody {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// Response envelope: `{ "result": ... }` or `{ "error": {...} }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallableResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<CallableErrorBody>,
}
