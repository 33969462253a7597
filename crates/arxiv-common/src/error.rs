//! Error types for the arXiv ETL

use thiserror::Error;

/// Result type alias for ETL operations
pub type EtlResult<T> = std::result::Result<T, EtlError>;

/// Main error type for the ETL
///
/// Harvest errors (`Network`, `Protocol`, `MalformedResponse`) abort the
/// current day without advancing the checkpoint. Load errors (`Storage`,
/// `Database`) abort the run and leave the staged file and the run lock in
/// place.
#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("OAI-PMH error [{code}]: {message}")]
    Protocol { code: String, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Malformed record {identifier}: {reason}")]
    MalformedRecord { identifier: String, reason: String },

    #[error("Run lock already held: {key}")]
    AlreadyLocked { key: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    /// Whether the next scheduled invocation can simply retry.
    ///
    /// Harvest failures leave no applied state behind. Load failures keep the
    /// run lock and need an operator before the next run proceeds.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EtlError::Network(_) | EtlError::Protocol { .. } | EtlError::MalformedResponse(_)
        )
    }

    /// Error code for a protocol-level failure, if any
    pub fn protocol_code(&self) -> Option<&str> {
        match self {
            EtlError::Protocol { code, .. } => Some(code),
            _ => None,
        }
    }
}
