//! Error types for Flowsmith
//!
//! This module provides the error hierarchy using thiserror.
//! All errors can be converted to FlowsmithError for unified error handling.

use thiserror::Error;

/// Main error type for Flowsmith operations
#[derive(Error, Debug)]
pub enum FlowsmithError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Missing credentials: {}", missing.join(", "))]
    MissingCredentials { missing: Vec<String> },

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// Implement From for sqlx::Error
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<sqlx::Error> for FlowsmithError {
    fn from(err: sqlx::Error) -> Self {
        FlowsmithError::Storage(StorageError::from(err))
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Connection timeout")]
    Timeout,

    #[error("Upstream rejected request: {0}")]
    Upstream(String),

    #[error("Reqwest error: {0}")]
    Reqwest(reqwest::Error),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else {
            NetworkError::Reqwest(err)
        }
    }
}

impl From<reqwest::Error> for FlowsmithError {
    fn from(err: reqwest::Error) -> Self {
        FlowsmithError::Network(NetworkError::from(err))
    }
}

/// Convenient result type for Flowsmith operations
pub type Result<T> = std::result::Result<T, FlowsmithError>;

impl FlowsmithError {
    /// Create a validation (client input) error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::Validation(msg.into())
    }

    /// Create a not found error
    #[inline]
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::NotFound(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::Storage(StorageError::Database(msg.into()))
    }

    /// Create a generation backend error
    #[inline]
    pub fn generation<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::Generation(msg.into())
    }

    /// Create a malformed model output error
    #[inline]
    pub fn malformed_output<S: Into<String>>(msg: S) -> Self {
        FlowsmithError::MalformedOutput(msg.into())
    }

    /// Whether the error came from the text-generation backend
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            FlowsmithError::Generation(_) | FlowsmithError::MalformedOutput(_)
        )
    }
}
