//! Error types for agentreplay-core

use crate::types::TranscriptFormat;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the agentreplay-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error (file not found, unreadable)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transcript format that has no parser yet
    #[error("{format} transcript parsing is not implemented")]
    UnsupportedFormat { format: TranscriptFormat },

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A source glob pattern that does not compile
    #[error("invalid glob pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A bounded read or assembly took too long
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking worker task panicked or was cancelled
    #[error("worker task failed: {0}")]
    Worker(String),
}

impl Error {
    /// True for both a failed session lookup and a missing file.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::SessionNotFound(_) => true,
            Error::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias for agentreplay-core
pub type Result<T> = std::result::Result<T, Error>;
