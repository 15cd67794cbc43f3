//! Per-connection actor.
//!
//! A client bridges one WebSocket connection to the hub with two pumps: the
//! inbound pump turns frames into broadcast submissions, the outbound pump
//! drains the client's queue onto the wire and keeps the connection alive
//! with periodic pings. Either pump failing cancels the shared token, which
//! terminates the other pump and drives exactly one close of the transport.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, Receiver};
use tokio::time::{interval_at, timeout, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::hub::{Hub, Subscriber};
use crate::chat::message::{BroadcastMessage, ChatMessage};
use crate::chat::net::connection::{FrameReader, FrameWriter};
use crate::chat::store::MessageStore;
use crate::chat::types::{ClientId, EventId, UserId};
use crate::wire::frame::{Frame, InboundPayload};

/// Time allowed to write a frame to the peer.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Read inactivity after which the connection is declared dead. Any frame
/// from the peer, pongs included, refreshes the window.
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Ping interval. Must be shorter than PONG_WAIT so at least one ping lands
/// inside every pong-timeout window.
pub const PING_PERIOD: Duration = Duration::from_secs(54);

/// Maximum inbound frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 512;

/// Capacity of the per-client outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Handle to a spawned connection actor.
pub struct Client {
    pub client_id: ClientId,
    pub event_id: EventId,
    pub user_id: UserId,
}

impl Client {
    /// Registers a subscriber with the hub and starts the two pumps.
    pub fn spawn(
        hub: Hub,
        store: Arc<dyn MessageStore>,
        reader: impl FrameReader + 'static,
        writer: impl FrameWriter + 'static,
        event_id: EventId,
        user_id: UserId,
    ) -> Self {
        let client_id = Uuid::new_v4();
        let (queue_tx, queue_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        hub.register(Subscriber {
            client_id,
            event_id,
            user_id,
            queue: queue_tx,
        });
        info!(
            "Client {} connected: user {} on event {}",
            client_id, user_id, event_id
        );

        let cancel = CancellationToken::new();
        tokio::spawn(read_pump(
            hub.clone(),
            store,
            reader,
            event_id,
            user_id,
            client_id,
            cancel.clone(),
        ));
        tokio::spawn(write_pump(writer, queue_rx, client_id, cancel));

        Self {
            client_id,
            event_id,
            user_id,
        }
    }
}

async fn read_pump(
    hub: Hub,
    store: Arc<dyn MessageStore>,
    mut reader: impl FrameReader,
    event_id: EventId,
    user_id: UserId,
    client_id: ClientId,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            read = timeout(PONG_WAIT, reader.read_frame()) => match read {
                Err(_) => {
                    debug!("Read deadline exceeded for client {}", client_id);
                    break;
                }
                Ok(Err(e)) => {
                    debug!("Read error for client {}: {}", client_id, e);
                    break;
                }
                Ok(Ok(frame)) => frame,
            },
        };

        match frame {
            // Keepalive traffic; the deadline was already refreshed by the
            // read itself.
            Frame::Ping | Frame::Pong => continue,
            Frame::Close => {
                debug!("Client {} sent close", client_id);
                break;
            }
            Frame::Text(text) => {
                if text.len() > MAX_FRAME_SIZE {
                    warn!(
                        "Client {} sent oversized frame ({} bytes), disconnecting",
                        client_id,
                        text.len()
                    );
                    break;
                }
                accept_inbound(&hub, store.as_ref(), event_id, user_id, text.as_bytes()).await;
            }
            Frame::Binary(data) => {
                if data.len() > MAX_FRAME_SIZE {
                    warn!(
                        "Client {} sent oversized frame ({} bytes), disconnecting",
                        client_id,
                        data.len()
                    );
                    break;
                }
                accept_inbound(&hub, store.as_ref(), event_id, user_id, &data).await;
            }
        }
    }

    hub.unregister(event_id, client_id);
    cancel.cancel();
    info!("Client {} disconnected", client_id);
}

async fn accept_inbound(
    hub: &Hub,
    store: &dyn MessageStore,
    event_id: EventId,
    user_id: UserId,
    raw: &[u8],
) {
    let payload = match InboundPayload::parse(raw) {
        Ok(payload) => payload,
        Err(e) => {
            // One bad frame does not cost the peer its connection.
            warn!("Discarding malformed frame from user {}: {}", user_id, e);
            return;
        }
    };

    let message = ChatMessage::new(event_id, user_id, payload.content);

    // Persist first so delivery order matches store order. A store failure
    // is logged and fan-out proceeds; liveness wins over per-message
    // durability.
    if let Err(e) = store.create(&message).await {
        error!("Failed to persist message {}: {}", message.id, e);
    }

    hub.broadcast(BroadcastMessage::new(event_id, message));
}

async fn write_pump(
    mut writer: impl FrameWriter,
    mut queue: Receiver<Arc<ChatMessage>>,
    client_id: ClientId,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Inbound pump is gone; tell the peer we are finished. The
                // write fails harmlessly if the transport already died.
                let _ = timeout(WRITE_WAIT, writer.write_frame(Frame::Close)).await;
                break;
            }
            next = queue.recv() => match next {
                // The hub closed the queue during unregistration.
                None => {
                    let _ = timeout(WRITE_WAIT, writer.write_frame(Frame::Close)).await;
                    break;
                }
                Some(payload) => {
                    let Some(body) = encode_batch(payload, &mut queue) else {
                        continue;
                    };
                    match timeout(WRITE_WAIT, writer.write_frame(Frame::Text(body))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!("Write error for client {}: {}", client_id, e);
                            break;
                        }
                        Err(_) => {
                            debug!("Write deadline exceeded for client {}", client_id);
                            break;
                        }
                    }
                }
            },
            _ = ticker.tick() => {
                match timeout(WRITE_WAIT, writer.write_frame(Frame::Ping)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!("Ping failed for client {}: {}", client_id, e);
                        break;
                    }
                    Err(_) => {
                        debug!("Ping deadline exceeded for client {}", client_id);
                        break;
                    }
                }
            }
        }
    }

    writer.close().await;
    cancel.cancel();
}

/// Serializes the payload plus any payloads already queued behind it into one
/// newline-separated text frame. The queue stays bounded; this only drains
/// what is already there.
fn encode_batch(first: Arc<ChatMessage>, queue: &mut Receiver<Arc<ChatMessage>>) -> Option<String> {
    let mut body = match serde_json::to_string(&*first) {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to encode message {}: {}", first.id, e);
            return None;
        }
    };

    while let Ok(next) = queue.try_recv() {
        match serde_json::to_string(&*next) {
            Ok(encoded) => {
                body.push('\n');
                body.push_str(&encoded);
            }
            Err(e) => warn!("Failed to encode message {}: {}", next.id, e),
        }
    }

    Some(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::store::InMemoryMessageStore;
    use crate::error::{ChatError, Result};
    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedSender;
    use tokio::time::sleep;

    struct ScriptedReader {
        frames: Vec<Frame>,
    }

    impl ScriptedReader {
        fn new(frames: Vec<Frame>) -> Self {
            Self { frames }
        }
    }

    #[async_trait]
    impl FrameReader for ScriptedReader {
        async fn read_frame(&mut self) -> Result<Frame> {
            if self.frames.is_empty() {
                // Stay connected without producing further frames.
                return Ok(std::future::pending::<Frame>().await);
            }
            Ok(self.frames.remove(0))
        }
    }

    struct RecordingWriter {
        tx: UnboundedSender<Frame>,
    }

    #[async_trait]
    impl FrameWriter for RecordingWriter {
        async fn write_frame(&mut self, frame: Frame) -> Result<()> {
            let _ = self.tx.send(frame);
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct FailingStore;

    #[async_trait]
    impl MessageStore for FailingStore {
        async fn create(&self, _message: &ChatMessage) -> Result<()> {
            Err(ChatError::Store("store unavailable".to_string()))
        }
    }

    fn text(raw: &str) -> Frame {
        Frame::Text(raw.to_string())
    }

    /// Registers a bare subscriber so tests can observe fan-out without a
    /// second connection.
    fn peer_subscriber(
        hub: &Hub,
        event_id: EventId,
    ) -> mpsc::Receiver<Arc<ChatMessage>> {
        let (tx, rx) = mpsc::channel(8);
        hub.register(Subscriber {
            client_id: Uuid::new_v4(),
            event_id,
            user_id: Uuid::new_v4(),
            queue: tx,
        });
        rx
    }

    fn spawn_client(
        hub: &Hub,
        store: Arc<dyn MessageStore>,
        event_id: EventId,
        frames: Vec<Frame>,
    ) -> (Client, mpsc::UnboundedReceiver<Frame>) {
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let client = Client::spawn(
            hub.clone(),
            store,
            ScriptedReader::new(frames),
            RecordingWriter { tx: writer_tx },
            event_id,
            Uuid::new_v4(),
        );
        (client, writer_rx)
    }

    async fn wait_for_count(hub: &Hub, event_id: EventId, expected: usize) {
        for _ in 0..100 {
            if hub.subscriber_count(event_id).await == expected {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "subscriber count for {} never reached {}",
            event_id, expected
        );
    }

    async fn recv_payload(rx: &mut mpsc::Receiver<Arc<ChatMessage>>) -> Arc<ChatMessage> {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for payload")
            .expect("queue closed")
    }

    #[tokio::test]
    async fn inbound_frame_is_stored_and_broadcast() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();
        let store = Arc::new(InMemoryMessageStore::new());
        let mut peer = peer_subscriber(&hub, event_id);

        let (client, _writer) = spawn_client(
            &hub,
            store.clone(),
            event_id,
            vec![text(r#"{"content": "hello"}"#)],
        );

        let payload = recv_payload(&mut peer).await;
        assert_eq!(payload.content, "hello");
        assert_eq!(payload.sender_id, client.user_id);
        assert_eq!(payload.event_id, event_id);

        let stored = store.messages_for_event(event_id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, payload.id);
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped_not_fatal() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();
        let mut peer = peer_subscriber(&hub, event_id);

        spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![text("this is not json"), text(r#"{"content": "after"}"#)],
        );

        let payload = recv_payload(&mut peer).await;
        assert_eq!(payload.content, "after");
    }

    #[tokio::test]
    async fn empty_content_is_accepted() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();
        let mut peer = peer_subscriber(&hub, event_id);

        spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![text("{}")],
        );

        let payload = recv_payload(&mut peer).await;
        assert_eq!(payload.content, "");
    }

    #[tokio::test]
    async fn store_failure_does_not_stop_broadcast() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();
        let mut peer = peer_subscriber(&hub, event_id);

        spawn_client(
            &hub,
            Arc::new(FailingStore),
            event_id,
            vec![text(r#"{"content": "still delivered"}"#)],
        );

        let payload = recv_payload(&mut peer).await;
        assert_eq!(payload.content, "still delivered");
    }

    #[tokio::test]
    async fn oversized_frame_disconnects() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();

        let oversized = format!(r#"{{"content": "{}"}}"#, "x".repeat(MAX_FRAME_SIZE));
        spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![text(&oversized)],
        );

        wait_for_count(&hub, event_id, 0).await;
    }

    #[tokio::test]
    async fn peer_close_unregisters_and_closes_transport() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();

        let (_client, mut writer) = spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![Frame::Close],
        );

        wait_for_count(&hub, event_id, 0).await;
        let frame = timeout(Duration::from_secs(1), writer.recv())
            .await
            .expect("timed out waiting for close frame");
        assert_eq!(frame, Some(Frame::Close));
    }

    #[tokio::test]
    async fn hub_unregister_drives_close_frame() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();

        let (client, mut writer) = spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![],
        );
        wait_for_count(&hub, event_id, 1).await;

        hub.unregister(event_id, client.client_id);

        let frame = timeout(Duration::from_secs(1), writer.recv())
            .await
            .expect("timed out waiting for close frame");
        assert_eq!(frame, Some(Frame::Close));
        wait_for_count(&hub, event_id, 0).await;
    }

    #[tokio::test]
    async fn broadcast_payload_reaches_the_wire_as_json() {
        let hub = Hub::new();
        let event_id = Uuid::new_v4();

        let (_client, mut writer) = spawn_client(
            &hub,
            Arc::new(InMemoryMessageStore::new()),
            event_id,
            vec![],
        );
        wait_for_count(&hub, event_id, 1).await;

        let sender = Uuid::new_v4();
        let message = ChatMessage::new(event_id, sender, "to the wire".to_string());
        hub.broadcast(BroadcastMessage::new(event_id, message));

        let frame = timeout(Duration::from_secs(1), writer.recv())
            .await
            .expect("timed out waiting for text frame")
            .expect("writer channel closed");
        let Frame::Text(body) = frame else {
            panic!("expected a text frame, got {:?}", frame);
        };
        let record: ChatMessage = serde_json::from_str(&body).unwrap();
        assert_eq!(record.content, "to the wire");
        assert_eq!(record.sender_id, sender);
    }
}
