//! Frame transport abstraction.
//!
//! The client pumps never touch the WebSocket library directly; they read
//! and write [`Frame`]s through this trait pair, one half per pump. The
//! concrete implementation wraps a split `tokio-tungstenite` stream.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::{ChatError, Result};
use crate::wire::frame::Frame;

/// Inbound half of a connection, owned by the inbound pump.
#[async_trait]
pub trait FrameReader: Send {
    /// Reads the next frame. An orderly end of stream is reported as
    /// `ChatError::ConnectionClosed`.
    async fn read_frame(&mut self) -> Result<Frame>;
}

/// Outbound half of a connection, owned by the outbound pump.
#[async_trait]
pub trait FrameWriter: Send {
    async fn write_frame(&mut self, frame: Frame) -> Result<()>;

    /// Closes the transport. Called exactly once, on pump termination.
    async fn close(&mut self);
}

pub struct WsFrameReader {
    inner: SplitStream<WebSocketStream<TcpStream>>,
}

pub struct WsFrameWriter {
    inner: SplitSink<WebSocketStream<TcpStream>, Message>,
}

/// Splits an upgraded WebSocket into the two pump-owned halves.
pub fn split_connection(socket: WebSocketStream<TcpStream>) -> (WsFrameReader, WsFrameWriter) {
    let (sink, stream) = socket.split();
    (WsFrameReader { inner: stream }, WsFrameWriter { inner: sink })
}

#[async_trait]
impl FrameReader for WsFrameReader {
    async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.inner.next().await {
                None => return Err(ChatError::ConnectionClosed),
                Some(Err(e)) => return Err(ChatError::Transport(e)),
                Some(Ok(message)) => match Frame::from_message(message) {
                    Some(frame) => return Ok(frame),
                    None => continue,
                },
            }
        }
    }
}

#[async_trait]
impl FrameWriter for WsFrameWriter {
    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.inner
            .send(frame.into_message())
            .await
            .map_err(ChatError::Transport)
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            debug!("Error closing connection: {}", e);
        }
    }
}
