use std::sync::Mutex;

use async_trait::async_trait;
use log::debug;

use crate::chat::message::ChatMessage;
use crate::chat::types::EventId;
use crate::error::Result;

/// Durable storage for accepted chat messages. The relay treats persistence
/// as best-effort: a failing store never stops fan-out.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create(&self, message: &ChatMessage) -> Result<()>;
}

/// Process-local store used by the standalone binary and the tests. A real
/// deployment substitutes its relational store behind the same trait.
#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored messages for one event, in insertion order.
    pub fn messages_for_event(&self, event_id: EventId) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.event_id == event_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: &ChatMessage) -> Result<()> {
        debug!("Storing message {} for event {}", message.id, message.event_id);
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}
