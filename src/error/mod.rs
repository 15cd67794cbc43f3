//! Error module for eventchat
//!
//! Defines the error type used throughout the chat relay. Connection-fatal
//! conditions (transport failures, deadlines, protocol violations) and
//! recoverable ones (a single malformed frame) are distinguished at the call
//! site, not here.

use thiserror::Error;

/// Main error type for eventchat
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("frame of {0} bytes exceeds limit of {1} bytes")]
    FrameTooLarge(usize, usize),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("unknown error: {0}")]
    Other(String),
}

impl ChatError {
    /// Reason string sent to the peer in an `{"error": ...}` frame during
    /// a rejected handshake.
    pub fn reject_reason(&self) -> String {
        match self {
            Self::Unauthorized(reason) => reason.clone(),
            Self::BadRequest(reason) => reason.clone(),
            _ => "internal server error".to_string(),
        }
    }
}

/// Result type alias for eventchat operations
pub type Result<T> = std::result::Result<T, ChatError>;

impl From<String> for ChatError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

impl From<&str> for ChatError {
    fn from(message: &str) -> Self {
        Self::Other(message.to_string())
    }
}
