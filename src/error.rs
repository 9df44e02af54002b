//! Domain error types for copilot-sdk
//!
//! `CopilotError` covers every failure the library surfaces:
//! - transport and framing failures (`Io`, `Protocol`, `ConnectionClosed`)
//! - JSON-RPC error responses from the agent (`JsonRpc`)
//! - lifecycle misuse (`NotConnected`, `SessionDestroyed`, ...)

use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Top-level error type for copilot-sdk
#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Client not connected. Call start() first.")]
    NotConnected,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to spawn agent: {0}")]
    ProcessSpawn(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("SDK protocol version mismatch: expected {expected}, server reports {actual:?}")]
    ProtocolMismatch { expected: u32, actual: Option<u32> },

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    #[error("Session '{0}' has been destroyed")]
    SessionDestroyed(String),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("Shutdown completed with errors: {}", .0.join("; "))]
    Shutdown(Vec<String>),
}

impl From<JsonRpcError> for CopilotError {
    fn from(err: JsonRpcError) -> Self {
        CopilotError::JsonRpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Result type alias for CopilotError
pub type Result<T> = std::result::Result<T, CopilotError>;
