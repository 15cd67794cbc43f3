//! WebSocket endpoint for per-event chat.
//!
//! Accepts TCP connections, performs the WebSocket handshake on
//! `/events/{event_uuid}/ws?token=...` and hands authenticated connections
//! to [`Client::spawn`]. The bearer token travels as a query parameter
//! because browser WebSocket clients cannot set headers; a failed handshake
//! is answered with a single `{"error": ...}` frame before the close.

use std::sync::Arc;

use futures_util::SinkExt;
use log::{info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::chat::auth::TokenValidator;
use crate::chat::client::Client;
use crate::chat::hub::Hub;
use crate::chat::net::connection::split_connection;
use crate::chat::store::MessageStore;
use crate::chat::types::EventId;
use crate::error::{ChatError, Result};

/// Binds the listener and serves chat connections until process shutdown.
pub async fn run_chat_server(
    addr: &str,
    hub: Hub,
    store: Arc<dyn MessageStore>,
    auth: Arc<dyn TokenValidator>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Chat server running on {}", addr);
    serve(listener, hub, store, auth).await
}

/// Accept loop over an already-bound listener. Public so tests can bind an
/// ephemeral port themselves.
pub async fn serve(
    listener: TcpListener,
    hub: Hub,
    store: Arc<dyn MessageStore>,
    auth: Arc<dyn TokenValidator>,
) -> std::io::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY for connection from {}: {}", addr, e);
        }
        info!("New connection from {}", addr);

        let hub = hub.clone();
        let store = store.clone();
        let auth = auth.clone();
        tokio::spawn(async move {
            if let Err(e) = accept_connection(stream, hub, store, auth).await {
                warn!("Connection from {} failed: {}", addr, e);
            }
        });
    }
}

async fn accept_connection(
    stream: TcpStream,
    hub: Hub,
    store: Arc<dyn MessageStore>,
    auth: Arc<dyn TokenValidator>,
) -> Result<()> {
    let mut uri: Option<Uri> = None;
    let mut socket = accept_hdr_async(stream, |request: &Request, response: Response| {
        uri = Some(request.uri().clone());
        Ok(response)
    })
    .await?;

    let credentials = uri
        .ok_or_else(|| ChatError::BadRequest("missing request URI".to_string()))
        .and_then(|uri| parse_upgrade_request(&uri))
        .and_then(|(event_id, token)| Ok((event_id, auth.validate(&token)?)));

    let (event_id, user_id) = match credentials {
        Ok(pair) => pair,
        Err(e) => {
            let reason = e.reject_reason();
            info!("Rejecting connection: {}", reason);
            let frame = serde_json::json!({ "error": reason }).to_string();
            let _ = socket.send(Message::Text(frame)).await;
            let _ = socket.close(None).await;
            return Ok(());
        }
    };

    let (reader, writer) = split_connection(socket);
    Client::spawn(hub, store, reader, writer, event_id, user_id);
    Ok(())
}

fn parse_upgrade_request(uri: &Uri) -> Result<(EventId, String)> {
    let event_id = parse_event_path(uri.path())?;
    let token = uri
        .query()
        .and_then(find_token)
        .ok_or_else(|| ChatError::Unauthorized("authorization token required".to_string()))?;
    Ok((event_id, token))
}

fn parse_event_path(path: &str) -> Result<EventId> {
    let mut segments = path.trim_matches('/').split('/');
    match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some("events"), Some(id), Some("ws"), None) => {
            Uuid::parse_str(id).map_err(|_| ChatError::BadRequest("invalid event id".to_string()))
        }
        _ => Err(ChatError::BadRequest("unknown path".to_string())),
    }
}

fn find_token(query: &str) -> Option<String> {
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == "token").then(|| value.to_string())
    })
}
