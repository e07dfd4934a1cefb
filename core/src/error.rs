//! Error types and handling for toolgate core

use thiserror::Error;

/// Result type alias for toolgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for toolgate core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Tool gateway errors
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Session store errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Session persistence errors
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Inference call errors
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {value}")]
    InvalidValue { field: String, value: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format")]
    InvalidFormat,
}

/// Tool gateway errors
#[derive(Error, Debug)]
pub enum GatewayError {
    /// One provider unreachable. Isolated during start-up, never fatal.
    #[error("Provider connection failed: {provider} - {message}")]
    ProviderConnection { provider: String, message: String },

    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// The caller is released on timeout; the underlying call may still run.
    #[error("Tool timed out: {name} after {seconds}s")]
    ToolTimeout { name: String, seconds: u64 },

    /// The provider returned an error payload for the call.
    #[error("Tool execution failed: {name} - {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Provider protocol error: {message}")]
    Protocol { message: String },
}

/// Session store errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {id}")]
    NotFound { id: String },
}

/// Session persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The storage directory cannot be created. The only fatal condition
    /// in the persistence layer.
    #[error("Storage directory unusable: {path} - {message}")]
    StorageUnavailable { path: String, message: String },

    #[error("Failed to serialize session {id}: {message}")]
    Serialization { id: String, message: String },

    #[error("Failed to load record: {path}")]
    LoadFailed { path: String },
}

/// Inference call errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {message}")]
    Network { message: String },
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Generic(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Generic(msg.to_string())
    }
}
