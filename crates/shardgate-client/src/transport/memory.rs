//! In-memory transport
//!
//! A [`MemoryConnector`] hands every connection's server side to a
//! [`MemoryAcceptor`], so a test can play the gateway without a socket.

use super::{CloseFrame, Connector, Frame, Transport};
use crate::error::TransportError;
use crate::protocol::{codec, Envelope};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Create a connected connector/acceptor pair
#[must_use]
pub fn memory_connector() -> (MemoryConnector, MemoryAcceptor) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MemoryConnector { peers: tx }, MemoryAcceptor { peers: rx })
}

/// Client side factory
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();

        let peer = MemoryPeer {
            url: url.to_string(),
            incoming: from_client,
            outgoing: to_client,
        };
        self.peers
            .send(peer)
            .map_err(|_| TransportError::Connect("acceptor dropped".to_string()))?;

        Ok(Box::new(MemoryTransport {
            outgoing: to_server,
            incoming: from_server,
        }))
    }
}

/// Server side factory: yields one [`MemoryPeer`] per client connect
#[derive(Debug)]
pub struct MemoryAcceptor {
    peers: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryAcceptor {
    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers.recv().await
    }

    /// Take a pending connection without waiting
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers.try_recv().ok()
    }
}

/// Client end of an in-memory connection
#[derive(Debug)]
pub struct MemoryTransport {
    outgoing: mpsc::UnboundedSender<Frame>,
    incoming: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Frame::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.incoming.close();
        self.outgoing
            .send(Frame::Close(Some(CloseFrame::new(code, reason))))
            .map_err(|_| TransportError::Closed)
    }
}

/// Server end of an in-memory connection
///
/// Dropping the peer looks like an abrupt disconnect to the client.
#[derive(Debug)]
pub struct MemoryPeer {
    url: String,
    incoming: mpsc::UnboundedReceiver<Frame>,
    outgoing: mpsc::UnboundedSender<Frame>,
}

impl MemoryPeer {
    /// URL the client connected to
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send an envelope to the client
    pub fn send_envelope(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let text = codec::encode(envelope).map_err(|e| TransportError::WebSocket(e.to_string()))?;
        self.send_text(text)
    }

    /// Send a raw text frame to the client
    pub fn send_text(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.outgoing
            .send(Frame::Text(text.into()))
            .map_err(|_| TransportError::Closed)
    }

    /// Close the connection from the server side
    pub fn close(&self, code: u16, reason: &str) -> Result<(), TransportError> {
        self.outgoing
            .send(Frame::Close(Some(CloseFrame::new(code, reason))))
            .map_err(|_| TransportError::Closed)
    }

    /// Next frame sent by the client; `None` once the client dropped its end
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.incoming.recv().await
    }

    /// Next envelope sent by the client
    ///
    /// Returns `None` when the client closes or drops the connection.
    /// Undecodable frames are skipped.
    pub async fn recv_envelope(&mut self) -> Option<Envelope> {
        loop {
            match self.incoming.recv().await? {
                Frame::Text(text) => match codec::decode(&text) {
                    Ok(envelope) => return Some(envelope),
                    Err(e) => tracing::warn!(error = %e, "Peer received undecodable frame"),
                },
                Frame::Binary(data) => {
                    if let Ok(envelope) = codec::decode_binary(&data) {
                        return Some(envelope);
                    }
                }
                Frame::Close(_) => return None,
            }
        }
    }

    /// Wait for the client's close frame, skipping anything sent before it
    pub async fn recv_close(&mut self) -> Option<CloseFrame> {
        loop {
            if let Frame::Close(close) = self.incoming.recv().await? {
                return close;
            }
        }
    }

    /// Frame already sent by the client, without waiting
    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        self.incoming.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut acceptor) = memory_connector();
        let mut client = connector.connect("memory://gateway").await.unwrap();
        let mut server = acceptor.accept().await.unwrap();
        assert_eq!(server.url(), "memory://gateway");

        server.send_envelope(&Envelope::hello(1000)).unwrap();
        let Some(Ok(Frame::Text(text))) = client.recv().await else {
            panic!("expected text frame");
        };
        assert_eq!(codec::decode(&text).unwrap().op, OpCode::Hello);

        client.send_text(r#"{"op":1,"d":null}"#.to_string()).await.unwrap();
        let envelope = server.recv_envelope().await.unwrap();
        assert_eq!(envelope.op, OpCode::Heartbeat);
    }

    #[tokio::test]
    async fn test_client_close_is_visible_to_peer() {
        let (connector, mut acceptor) = memory_connector();
        let mut client = connector.connect("memory://gateway").await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        client.close(4000, "reconnecting").await.unwrap();
        assert_eq!(server.recv_close().await, Some(CloseFrame::new(4000, "reconnecting")));
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_stream() {
        let (connector, mut acceptor) = memory_connector();
        let mut client = connector.connect("memory://gateway").await.unwrap();
        drop(acceptor.accept().await.unwrap());

        assert!(client.recv().await.is_none());
        assert!(matches!(
            client.send_text("x".to_string()).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_connect_fails_without_acceptor() {
        let (connector, acceptor) = memory_connector();
        drop(acceptor);
        assert!(matches!(
            connector.connect("memory://gateway").await,
            Err(TransportError::Connect(_))
        ));
    }
}
