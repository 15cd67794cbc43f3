use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::chat::types::{EventId, UserId};

/// A chat message within an event context. This is the record handed to the
/// store and serialized verbatim to every subscriber of the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub event_id: EventId,
    pub sender_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(event_id: EventId, sender_id: UserId, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            sender_id,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Envelope submitted to the hub: a payload and the event it belongs to.
/// Not retained after fan-out; the hub keeps no history.
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    pub event_id: EventId,
    pub payload: Arc<ChatMessage>,
}

impl BroadcastMessage {
    pub fn new(event_id: EventId, message: ChatMessage) -> Self {
        Self {
            event_id,
            payload: Arc::new(message),
        }
    }
}
