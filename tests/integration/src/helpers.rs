//! Test helpers for integration tests
//!
//! Provides a mock gateway: an axum WebSocket server that hands every
//! accepted socket to the test as a [`GatewayConn`] it can script.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    http::Uri,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use shardgate_client::protocol::codec;
use shardgate_client::{Envelope, OpCode};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// How long a test waits for the client before failing
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// What the client sent on one socket
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Envelope(Envelope),
    Close(Option<u16>),
}

enum ServerFrame {
    Text(String),
    Close(u16, String),
}

#[derive(Clone)]
struct MockState {
    connections: mpsc::UnboundedSender<GatewayConn>,
}

/// Mock gateway server
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<GatewayConn>,
    _handle: JoinHandle<()>,
}

impl MockGateway {
    /// Start a gateway on an ephemeral port
    pub async fn start() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new()
            .route("/gateway", get(gateway_handler))
            .route("/resume", get(gateway_handler))
            .with_state(MockState { connections: tx });

        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            addr,
            connections: rx,
            _handle: handle,
        })
    }

    /// URL clients identify against
    pub fn url(&self) -> String {
        format!("ws://{}/gateway", self.addr)
    }

    /// URL advertised in READY for resuming
    pub fn resume_url(&self) -> String {
        format!("ws://{}/resume", self.addr)
    }

    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Result<GatewayConn> {
        tokio::time::timeout(RECV_TIMEOUT, self.connections.recv())
            .await
            .context("No client connected")?
            .ok_or_else(|| anyhow!("Mock gateway stopped"))
    }

    /// Connection made since the last accept, without waiting
    pub fn try_accept(&mut self) -> Option<GatewayConn> {
        self.connections.try_recv().ok()
    }
}

/// One client socket as seen by the mock gateway
///
/// Dropping it tears the socket down without a close frame.
pub struct GatewayConn {
    /// Path and query the client requested
    pub uri: String,
    incoming: mpsc::UnboundedReceiver<ClientFrame>,
    outgoing: mpsc::UnboundedSender<ServerFrame>,
}

impl GatewayConn {
    pub fn send(&self, envelope: &Envelope) -> Result<()> {
        let text = codec::encode(envelope)?;
        self.outgoing
            .send(ServerFrame::Text(text))
            .map_err(|_| anyhow!("Socket already closed"))
    }

    pub fn send_hello(&self, interval_ms: u64) -> Result<()> {
        self.send(&Envelope::hello(interval_ms))
    }

    /// Close with a gateway close code
    pub fn close(&self, code: u16, reason: &str) -> Result<()> {
        self.outgoing
            .send(ServerFrame::Close(code, reason.to_string()))
            .map_err(|_| anyhow!("Socket already closed"))
    }

    /// Next frame from the client
    pub async fn recv(&mut self) -> Result<ClientFrame> {
        tokio::time::timeout(RECV_TIMEOUT, self.incoming.recv())
            .await
            .context("Client sent nothing")?
            .ok_or_else(|| anyhow!("Socket closed without a close frame"))
    }

    /// Next envelope with `op`, acknowledging heartbeats on the way
    pub async fn expect_op(&mut self, op: OpCode) -> Result<Envelope> {
        loop {
            match self.recv().await? {
                ClientFrame::Envelope(envelope) if envelope.op == op => return Ok(envelope),
                ClientFrame::Envelope(envelope) if envelope.op == OpCode::Heartbeat => {
                    self.send(&Envelope::heartbeat_ack())?;
                }
                ClientFrame::Envelope(envelope) => bail!("Expected op {op}, got {envelope}"),
                ClientFrame::Close(code) => bail!("Expected op {op}, client closed with {code:?}"),
            }
        }
    }

    /// Wait for the client's close frame and return its code
    pub async fn expect_close(&mut self) -> Result<Option<u16>> {
        loop {
            if let ClientFrame::Close(code) = self.recv().await? {
                return Ok(code);
            }
        }
    }
}

async fn gateway_handler(
    State(state): State<MockState>,
    uri: Uri,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, uri.to_string(), socket))
}

/// Pump frames between the socket and the test's [`GatewayConn`]
async fn handle_socket(state: MockState, uri: String, socket: WebSocket) {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();

    let conn = GatewayConn {
        uri,
        incoming: in_rx,
        outgoing: out_tx,
    };
    if state.connections.send(conn).is_err() {
        return;
    }

    let (mut ws_sink, mut ws_stream) = socket.split();

    loop {
        tokio::select! {
            msg = ws_stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    // Undecodable frames are the client's bug; let the test time out on them
                    if let Ok(envelope) = codec::decode(&text) {
                        let _ = in_tx.send(ClientFrame::Envelope(envelope));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = in_tx.send(ClientFrame::Close(frame.map(|f| f.code)));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            frame = out_rx.recv() => match frame {
                Some(ServerFrame::Text(text)) => {
                    if ws_sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Some(ServerFrame::Close(code, reason)) => {
                    let close = CloseFrame { code, reason: reason.into() };
                    if ws_sink.send(Message::Close(Some(close))).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
}
