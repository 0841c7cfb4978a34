//! Socket abstraction
//!
//! The controller talks to a [`Transport`] obtained from a [`Connector`]. The
//! WebSocket implementation is used in production, the in-memory one in tests.

mod memory;
mod websocket;

pub use memory::{memory_connector, MemoryAcceptor, MemoryConnector, MemoryPeer, MemoryTransport};
pub use websocket::{WebSocketConnector, WebSocketTransport};

use crate::error::TransportError;
use async_trait::async_trait;

/// Close frame payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A frame received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// Server closed the socket, with or without a close frame
    Close(Option<CloseFrame>),
}

/// An open, message-framed connection
///
/// `recv` must be cancel safe: the controller polls it inside `select!`.
#[async_trait]
pub trait Transport: Send {
    /// Write a text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next frame; `None` once the connection is gone
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection with the given code
    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError>;
}

/// Opens transports
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}
