//! Central broadcast hub.
//!
//! The registry of live subscribers is owned by a single control-loop task;
//! register, unregister and broadcast arrive over one command channel and are
//! applied strictly in order. No lock guards the registry because nothing
//! else can reach it.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::chat::message::{BroadcastMessage, ChatMessage};
use crate::chat::types::{ClientId, EventId, UserId};

/// Registration handle for one live connection. The hub holds the sending
/// side of the client's outbound queue; dropping it on unregister is what
/// terminates the client's outbound pump.
pub struct Subscriber {
    pub client_id: ClientId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub queue: mpsc::Sender<Arc<ChatMessage>>,
}

enum HubCommand {
    Register(Subscriber),
    Unregister {
        event_id: EventId,
        client_id: ClientId,
    },
    Broadcast(BroadcastMessage),
    SubscriberCount {
        event_id: EventId,
        reply: oneshot::Sender<usize>,
    },
}

/// Handle to the process-wide hub. Cheap to clone; one control loop runs
/// behind all handles for the lifetime of the process.
#[derive(Clone)]
pub struct Hub {
    tx: UnboundedSender<HubCommand>,
}

impl Hub {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(control_loop(rx));
        Self { tx }
    }

    /// Adds the subscriber under its event id. Registering the same client
    /// id twice is a no-op overwrite.
    pub fn register(&self, subscriber: Subscriber) {
        self.send(HubCommand::Register(subscriber));
    }

    /// Removes the subscriber and closes its outbound queue. Safe to call
    /// for a client that was already removed.
    pub fn unregister(&self, event_id: EventId, client_id: ClientId) {
        self.send(HubCommand::Unregister {
            event_id,
            client_id,
        });
    }

    /// Fans the payload out to every current subscriber of the message's
    /// event. Never blocks; see the drop policy in the control loop.
    pub fn broadcast(&self, message: BroadcastMessage) {
        self.send(HubCommand::Broadcast(message));
    }

    /// Number of live subscribers for one event.
    pub async fn subscriber_count(&self, event_id: EventId) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::SubscriberCount { event_id, reply });
        rx.await.unwrap_or(0)
    }

    fn send(&self, command: HubCommand) {
        // Fails only after the control loop is gone, i.e. process shutdown.
        if self.tx.send(command).is_err() {
            warn!("Hub control loop is gone, dropping command");
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

async fn control_loop(mut rx: UnboundedReceiver<HubCommand>) {
    let mut registry: HashMap<EventId, HashMap<ClientId, Subscriber>> = HashMap::new();

    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register(subscriber) => {
                info!(
                    "Registering client {} (user {}) for event {}",
                    subscriber.client_id, subscriber.user_id, subscriber.event_id
                );
                registry
                    .entry(subscriber.event_id)
                    .or_default()
                    .insert(subscriber.client_id, subscriber);
            }

            HubCommand::Unregister {
                event_id,
                client_id,
            } => {
                if let Some(subscribers) = registry.get_mut(&event_id) {
                    if subscribers.remove(&client_id).is_some() {
                        info!("Unregistered client {} from event {}", client_id, event_id);
                    }
                    // Empty event entries are dropped so the registry does
                    // not grow with short-lived events.
                    if subscribers.is_empty() {
                        registry.remove(&event_id);
                        debug!("Removed empty registry entry for event {}", event_id);
                    }
                }
            }

            HubCommand::Broadcast(message) => {
                let Some(subscribers) = registry.get(&message.event_id) else {
                    debug!("No subscribers for event {}", message.event_id);
                    continue;
                };
                debug!(
                    "Broadcasting message to {} subscribers of event {}",
                    subscribers.len(),
                    message.event_id
                );
                for subscriber in subscribers.values() {
                    match subscriber.queue.try_send(message.payload.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            // Slow consumer: drop for this subscriber only.
                            // Eviction is driven by transport failure, not by
                            // a momentarily full queue.
                            debug!(
                                "Outbound queue full for client {}, dropping payload",
                                subscriber.client_id
                            );
                        }
                        Err(TrySendError::Closed(_)) => {
                            debug!(
                                "Outbound queue closed for client {}, skipping",
                                subscriber.client_id
                            );
                        }
                    }
                }
            }

            HubCommand::SubscriberCount { event_id, reply } => {
                let count = registry.get(&event_id).map_or(0, |subscribers| subscribers.len());
                let _ = reply.send(count);
            }
        }
    }
}
