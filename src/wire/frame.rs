//! Wire frames exchanged with chat peers.
//!
//! Inbound, a peer sends one JSON object per text frame: `{"content": "..."}`
//! with unknown fields ignored and a missing `content` accepted as an empty
//! message. Outbound frames carry the full serialized message record
//! (see `chat::message::ChatMessage`).

use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// A single message-oriented frame on the wire, decoupled from the
/// underlying WebSocket library types.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping,
    Pong,
    Close,
}

impl Frame {
    /// Maps a transport message onto a frame. Raw protocol frames that the
    /// message-level API never hands out are reported as `None` and skipped
    /// by the reader.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Self::Text(text)),
            Message::Binary(data) => Some(Self::Binary(data)),
            Message::Ping(_) => Some(Self::Ping),
            Message::Pong(_) => Some(Self::Pong),
            Message::Close(_) => Some(Self::Close),
            Message::Frame(_) => None,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Self::Text(text) => Message::Text(text),
            Self::Binary(data) => Message::Binary(data),
            Self::Ping => Message::Ping(Vec::new()),
            Self::Pong => Message::Pong(Vec::new()),
            Self::Close => Message::Close(None::<CloseFrame>),
        }
    }

    /// Payload size in bytes, as counted against the inbound frame limit.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(data) => data.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The inbound chat payload. Extra fields are ignored; an absent `content`
/// is treated as an empty message and accepted.
#[derive(Debug, Deserialize)]
pub struct InboundPayload {
    #[serde(default)]
    pub content: String,
}

impl InboundPayload {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }
}
