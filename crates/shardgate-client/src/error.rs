//! Error types
//!
//! One enum per layer. Only [`CommandError`] is ever handed back to callers;
//! everything else is logged and folded into the reconnect or fatal path.

use crate::protocol::CloseCode;
use std::fmt;
use thiserror::Error;

/// Frame encoding/decoding errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame is not a valid envelope
    #[error("Malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// Binary frame is not UTF-8
    #[error("Binary frame is not valid UTF-8")]
    InvalidUtf8,

    /// Envelope could not be serialized
    #[error("Failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Socket-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Connection attempt exceeded the configured timeout
    #[error("Connection timed out")]
    Timeout,

    /// WebSocket protocol or I/O error on an open connection
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Socket is already closed
    #[error("Connection closed")]
    Closed,
}

/// Why a live connection was torn down before reconnecting
///
/// Every variant is recoverable; the controller reconnects after backoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// A heartbeat tick fired with the previous heartbeat still unacknowledged
    LivenessFailure,

    /// Server sent Invalid Session
    SessionInvalidated { resumable: bool },

    /// Server sent Reconnect
    ReconnectRequested,

    /// Transport failed (connect error, read/write error)
    Transport(String),

    /// Server closed the socket with a non-fatal code (or no code)
    ServerClosed { code: Option<u16>, reason: String },
}

impl DisconnectCause {
    /// Short label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::LivenessFailure => "liveness_failure",
            Self::SessionInvalidated { .. } => "session_invalidated",
            Self::ReconnectRequested => "reconnect_requested",
            Self::Transport(_) => "transport",
            Self::ServerClosed { .. } => "server_closed",
        }
    }
}

impl fmt::Display for DisconnectCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LivenessFailure => write!(f, "heartbeat not acknowledged"),
            Self::SessionInvalidated { resumable } => {
                write!(f, "session invalidated (resumable: {resumable})")
            }
            Self::ReconnectRequested => write!(f, "server requested reconnect"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::ServerClosed { code: Some(code), reason } => {
                write!(f, "server closed connection ({code}): {reason}")
            }
            Self::ServerClosed { code: None, .. } => write!(f, "server closed connection"),
        }
    }
}

impl From<TransportError> for DisconnectCause {
    fn from(err: TransportError) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Why a shard stopped for good
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalRejection {
    /// Server closed the connection with a code that forbids reconnecting
    #[error("Rejected by server: {code}")]
    Rejected { code: CloseCode },

    /// Caller asked the shard to stop
    #[error("Shut down by caller")]
    Shutdown,
}

impl FatalRejection {
    /// Close code behind the rejection, if any
    #[must_use]
    pub const fn close_code(&self) -> Option<CloseCode> {
        match self {
            Self::Rejected { code } => Some(*code),
            Self::Shutdown => None,
        }
    }
}

/// Errors returned to callers sending commands through a shard
#[derive(Debug, Error)]
pub enum CommandError {
    /// Shard is not in the Connected phase
    #[error("Shard is not connected")]
    NotConnected,

    /// Shard task has stopped
    #[error("Shard has stopped")]
    Stopped,

    /// Command payload could not be encoded
    #[error(transparent)]
    Encode(#[from] CodecError),

    /// Frame could not be written to the socket
    #[error(transparent)]
    Transport(#[from] TransportError),
}
