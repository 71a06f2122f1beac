//! Error types for the frame bridge.
//!
//! Errors never cross the boundary as structured values. The dispatcher
//! flattens whatever went wrong into a message string, and the calling side
//! rebuilds only a [`BridgeError::Remote`] carrying that string.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the frame bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Transport errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bridge is closed")]
    Closed,

    /// Error outcome reported by the counterpart. Displays as the bare message.
    #[error("{0}")]
    Remote(String),

    // Dispatcher-side errors, flattened onto the wire as-is
    #[error("{0}")]
    MethodNotFound(String),

    #[error("{0}")]
    Handler(String),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BridgeError {
    /// Convenience constructor for configuration errors.
    pub fn config(message: impl Into<String>) -> Self {
        BridgeError::Config {
            message: message.into(),
        }
    }

    /// Convenience constructor for transport errors.
    pub fn transport(message: impl Into<String>) -> Self {
        BridgeError::Transport {
            message: message.into(),
        }
    }

    /// Convenience constructor for handler failures.
    pub fn handler(message: impl Into<String>) -> Self {
        BridgeError::Handler(message.into())
    }

    /// True when the call was abandoned because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BridgeError::Timeout(_))
    }

    /// Check if a caller could reasonably retry this call.
    ///
    /// The bridge itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::Timeout(_) | BridgeError::Transport { .. }
        )
    }
}
