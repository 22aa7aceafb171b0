//! Crate-wide error type and conversions.
//!
//! One enum covers the whole failure taxonomy: transient fetch problems,
//! session-level listing failures, permission refusals, lookups of unknown
//! resources, and the ambient config/storage/serialization cases.

use thiserror::Error;

/// Result type alias for Hyperion operations
pub type Result<T> = std::result::Result<T, HyperionError>;

/// Main error type for Hyperion
#[derive(Debug, Error)]
pub enum HyperionError {
    /// Configuration load or validation failures
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Transient remote API errors (single system/device fetch)
    #[error("API error: {message}")]
    Api { message: String },

    /// Session-level errors (the accessible system list cannot be fetched)
    #[error("Session error: {message}")]
    Session { message: String },

    /// Notification permission refused by the platform
    #[error("Permission denied: {message}")]
    Permission { message: String },

    /// Lookup of an unknown resource (incident id, system id)
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Durable key-value storage errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// REST surface failures
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serde encode/decode failures (store documents, YAML config)
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Filesystem failures
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Transport-level failures from the HTTP client
    #[error("Network error: {message}")]
    Network { message: String },

    /// Field-level validation failures
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Request deadline exceeded
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Catch-all with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl HyperionError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        HyperionError::Config {
            message: message.into(),
        }
    }

    pub fn api<S: Into<String>>(message: S) -> Self {
        HyperionError::Api {
            message: message.into(),
        }
    }

    pub fn session<S: Into<String>>(message: S) -> Self {
        HyperionError::Session {
            message: message.into(),
        }
    }

    pub fn permission<S: Into<String>>(message: S) -> Self {
        HyperionError::Permission {
            message: message.into(),
        }
    }

    /// Not-found error naming the missing resource
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        HyperionError::NotFound {
            resource: resource.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        HyperionError::Storage {
            message: message.into(),
        }
    }

    pub fn web<S: Into<String>>(message: S) -> Self {
        HyperionError::Web {
            message: message.into(),
        }
    }

    /// Validation error for one named field
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        HyperionError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        HyperionError::Io {
            message: message.into(),
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        HyperionError::Network {
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(message: S) -> Self {
        HyperionError::Timeout {
            message: message.into(),
        }
    }

    pub fn generic<S: Into<String>>(message: S) -> Self {
        HyperionError::Generic {
            message: message.into(),
        }
    }

    /// Whether this error leaves the refresh loop operational (retried on the
    /// next cycle rather than surfaced as a dashboard-level failure)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HyperionError::Api { .. }
                | HyperionError::Network { .. }
                | HyperionError::Timeout { .. }
        )
    }
}

impl From<std::io::Error> for HyperionError {
    fn from(err: std::io::Error) -> Self {
        HyperionError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for HyperionError {
    fn from(err: serde_yaml::Error) -> Self {
        HyperionError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for HyperionError {
    fn from(err: serde_json::Error) -> Self {
        HyperionError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for HyperionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HyperionError::timeout(err.to_string())
        } else {
            HyperionError::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for HyperionError {
    fn from(err: chrono::ParseError) -> Self {
        HyperionError::validation("datetime", &err.to_string())
    }
}
