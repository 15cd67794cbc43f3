pub mod auth;
pub mod client;
pub mod config;
pub mod hub;
pub mod message;
pub mod net;
pub mod store;
pub mod types;

use std::sync::Arc;

use auth::{JwtValidator, TokenValidator};
use config::ServerConfig;
use hub::Hub;
use net::server::run_chat_server;
use store::{InMemoryMessageStore, MessageStore};

/// Wires up the hub, store and validator and runs the chat server.
pub async fn init(config: ServerConfig) -> std::io::Result<()> {
    let hub = Hub::new();
    let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let auth: Arc<dyn TokenValidator> = Arc::new(JwtValidator::new(&config.jwt_secret));

    run_chat_server(&config.addr, hub, store, auth).await
}
