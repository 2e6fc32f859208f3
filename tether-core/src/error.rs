//! Failure causes carried by a failed fetch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Body of a non-2xx response.
///
/// Servers usually explain themselves in JSON; when they don't, the raw text
/// is kept so nothing the server said is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorBody {
    Json(Value),
    Text(String),
}

impl ErrorBody {
    /// Parse `raw` as JSON, falling back to the raw text.
    pub fn from_raw(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => ErrorBody::Json(value),
            Err(_) => ErrorBody::Text(raw.to_string()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ErrorBody::Json(value) => Some(value),
            ErrorBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ErrorBody::Json(_) => None,
            ErrorBody::Text(text) => Some(text),
        }
    }
}

/// Why a fetch attempt did not produce a value.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchFailure {
    /// The request failed before any response arrived.
    #[error("Unable to fetch {url}: {message}")]
    Network { url: String, message: String },

    /// A response arrived with a non-2xx status.
    #[error("Unable to fetch {url}: HTTP {status}")]
    Status {
        url: String,
        status: u16,
        status_text: Option<String>,
        body: ErrorBody,
    },

    /// A 2xx response whose body is not JSON.
    #[error("Invalid JSON from {url} (HTTP {status}): {reason}")]
    InvalidBody {
        url: String,
        status: u16,
        text: String,
        reason: String,
    },
}

impl FetchFailure {
    pub fn url(&self) -> &str {
        match self {
            FetchFailure::Network { url, .. }
            | FetchFailure::Status { url, .. }
            | FetchFailure::InvalidBody { url, .. } => url,
        }
    }

    /// Status code of the response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchFailure::Network { .. } => None,
            FetchFailure::Status { status, .. } | FetchFailure::InvalidBody { status, .. } => {
                Some(*status)
            }
        }
    }

    /// Raw response text, when the server sent something that wasn't JSON.
    pub fn text(&self) -> Option<&str> {
        match self {
            FetchFailure::Status { body, .. } => body.as_text(),
            FetchFailure::InvalidBody { text, .. } => Some(text),
            FetchFailure::Network { .. } => None,
        }
    }

    /// Parsed JSON error body, when the server sent one.
    pub fn json(&self) -> Option<&Value> {
        match self {
            FetchFailure::Status { body, .. } => body.as_json(),
            _ => None,
        }
    }
}
