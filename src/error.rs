//! Error types and handling for the wallbox client
//!
//! This module defines the error types used throughout the crate. Most device
//! level failures never surface as errors: the request executor and the parsers
//! degrade them to empty results and log lines. The enum below is what the
//! configuration, logging and transport layers report.

use thiserror::Error;

/// Result type alias for wallbox operations
pub type Result<T> = std::result::Result<T, WallboxError>;

/// Main error type for the wallbox client
#[derive(Debug, Error)]
pub enum WallboxError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Transport errors (connection refused, reset, TLS)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// The device answered with something we do not understand
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl WallboxError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        WallboxError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        WallboxError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        WallboxError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        WallboxError::Network {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        WallboxError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        WallboxError::Protocol {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        WallboxError::Generic {
            message: message.into(),
        }
    }

    /// Whether this error is a timeout (as opposed to any other transport failure)
    pub fn is_timeout(&self) -> bool {
        matches!(self, WallboxError::Timeout { .. })
    }
}

impl From<std::io::Error> for WallboxError {
    fn from(err: std::io::Error) -> Self {
        WallboxError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for WallboxError {
    fn from(err: serde_yaml::Error) -> Self {
        WallboxError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WallboxError {
    fn from(err: serde_json::Error) -> Self {
        WallboxError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for WallboxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WallboxError::timeout(err.to_string())
        } else {
            WallboxError::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for WallboxError {
    fn from(err: chrono::ParseError) -> Self {
        WallboxError::validation("datetime", err.to_string().as_str())
    }
}

/// Strip credentials and addresses from an error message before it is logged.
///
/// The host and password are masked wherever they appear and the result is
/// truncated to 200 characters.
pub fn sanitize_message(message: &str, secrets: &[&str]) -> String {
    let mut out = message.to_string();
    for secret in secrets.iter().filter(|s| !s.is_empty()) {
        out = out.replace(secret, "<redacted>");
    }
    if out.chars().count() > 200 {
        out = out.chars().take(200).collect::<String>() + "...";
    }
    out
}
