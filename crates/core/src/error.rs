//! Error types for pushpilot-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pushpilot-core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for pushpilot-core
#[derive(Error, Debug)]
pub enum Error {
    /// Upload options rejected during validation
    #[error(transparent)]
    UploadConfig(#[from] ConfigError),

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidConfig(String),

    /// Control-plane API errors
    #[error("Control plane error: {0}")]
    ControlPlane(String),

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(String),

    /// Server answer does not follow the resumable upload range contract
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Byte range outside of the file
    #[error("Invalid byte range: start={start}, end={end}, file size={file_len}")]
    InvalidRange { start: u64, end: u64, file_len: u64 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// `start` called on a session that already left `Idle`
    #[error("Upload session already started")]
    AlreadyStarted,

    /// Session actor is gone
    #[error("Upload session closed")]
    SessionClosed,

    /// Timeout
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled by user
    #[error("Operation cancelled")]
    Cancelled,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

/// Reasons an upload configuration is rejected before a session exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Chunk size should be between 5 MiB and 500 MiB (got {0} bytes)")]
    ChunkSize(u64),

    #[error("No file was given to upload")]
    MissingFile,

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("File is not readable: {0}")]
    FileNotReadable(PathBuf),

    #[error("File is empty: {0}")]
    FileEmpty(PathBuf),

    #[error("No signed destination URL was given")]
    MissingUrl,

    #[error("Maximum retry delay must not be shorter than the base retry delay")]
    RetryDelay,
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else if err.is_connect() {
            Error::Network(err.to_string())
        } else if err.is_request() {
            Error::HttpClient(err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}
