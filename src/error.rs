//! Error types and handling for Elektra
//!
//! This module defines the error types used throughout the crate,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Elektra operations
pub type Result<T> = std::result::Result<T, ElektraError>;

/// Main error type for Elektra
#[derive(Debug, Error)]
pub enum ElektraError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Message bus transport errors
    #[error("Bus error: {message}")]
    Bus { message: String },

    /// Timeout errors (no fresh value within the configured window)
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Validation errors (a value parsed but is semantically invalid)
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Operation requires a capability the device does not expose
    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl ElektraError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ElektraError::Config {
            message: message.into(),
        }
    }

    /// Create a new bus transport error
    pub fn bus<S: Into<String>>(message: S) -> Self {
        ElektraError::Bus {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ElektraError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        ElektraError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new unsupported-operation error
    pub fn unsupported<S: Into<String>>(message: S) -> Self {
        ElektraError::Unsupported {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ElektraError::Io {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        ElektraError::Generic {
            message: message.into(),
        }
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ElektraError::Timeout { .. })
    }
}

impl From<std::io::Error> for ElektraError {
    fn from(err: std::io::Error) -> Self {
        ElektraError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ElektraError {
    fn from(err: serde_yaml::Error) -> Self {
        ElektraError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ElektraError {
    fn from(err: serde_json::Error) -> Self {
        ElektraError::Serialization {
            message: err.to_string(),
        }
    }
}
