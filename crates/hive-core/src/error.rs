//! Unified error types for Hive

use thiserror::Error;

/// Unified error type for all Hive operations
#[derive(Error, Debug)]
pub enum HiveError {
    // Generation errors
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("API limit reached: {0}")]
    ApiLimit(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    // Worker errors
    #[error("Worker busy: {0}")]
    WorkerBusy(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // Merge pipeline errors
    #[error("Gate '{gate}' aborted the merge: {message}")]
    GateAborted { gate: String, message: String },

    #[error("Invalid merge transition: {0}")]
    InvalidTransition(String),

    #[error("Merge already in progress: {0}")]
    MergeInProgress(String),

    #[error("Merge not found: {0}")]
    MergeNotFound(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Failed to apply merge: {0}")]
    MergeApply(String),

    #[error("Verification service error: {0}")]
    Verification(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias using HiveError
pub type Result<T> = std::result::Result<T, HiveError>;
