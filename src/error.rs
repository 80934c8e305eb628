//! Error types for mcpipe
//!
//! Provides a unified error type for all operations.
//!
//! Only conditions that break an invariant surface as `Err`. Cache misses,
//! refused stores and CAS conflicts are ordinary results (`None`, `false`,
//! [`CasResult`](crate::client::CasResult)).

use thiserror::Error;

/// Result type alias using McError
pub type Result<T> = std::result::Result<T, McError>;

/// Unified error type for mcpipe operations
#[derive(Debug, Error)]
pub enum McError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    /// Framing or stream desynchronization. The connection must be discarded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Contract Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Contract violation: {0}")]
    Contract(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Operation not supported by the {0} protocol")]
    Unsupported(&'static str),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl McError {
    /// Returns true if the connection that produced this error can no longer be trusted.
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(self, McError::Io(_) | McError::Protocol(_))
    }
}
