//! Error types for the engine.

use thiserror::Error;

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Store-related errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node {platform}:{room} already belongs to bridge {bridge_id}")]
    AlreadyBridged {
        platform: String,
        room: String,
        bridge_id: i64,
    },

    #[error("Invalid bridge: {0}")]
    InvalidBridge(String),
}

/// Errors raised while matching a source room to target platforms.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Source adapter '{0}' is not registered")]
    SourceOffline(String),

    #[error("Hub adapter '{0}' is not registered")]
    HubOffline(String),

    #[error("No available target platforms")]
    NoTargets,

    #[error("Insufficient nodes to form a bridge (got {got}, need 2)")]
    InsufficientNodes { got: usize },

    #[error("Creating room on '{platform}' failed: {message}")]
    CreateRoom { platform: String, message: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for config operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
