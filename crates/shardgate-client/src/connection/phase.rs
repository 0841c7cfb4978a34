//! Connection phases

use serde::Serialize;
use std::fmt;

/// Phase of a shard's connection lifecycle
///
/// Written only by the shard's controller; everyone else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Not started yet
    Disconnected,
    /// Opening the socket
    Connecting,
    /// Socket open, waiting for Hello
    AwaitingHello,
    /// Identify sent (or waiting for an identify turn), waiting for READY
    Identifying,
    /// Resume sent, waiting for RESUMED
    Resuming,
    /// Handshake complete, events flowing
    Connected,
    /// Connection dropped, waiting out the backoff delay
    Reconnecting,
    /// Stopped for good
    FatallyClosed,
}

impl ConnectionPhase {
    /// Whether no further transitions can happen
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::FatallyClosed)
    }

    /// Whether user commands may be sent
    #[must_use]
    pub const fn accepts_commands(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether moving from `self` to `next` is a legal transition
    #[must_use]
    pub const fn allows(self, next: Self) -> bool {
        use ConnectionPhase::{
            AwaitingHello, Connected, Connecting, Disconnected, FatallyClosed, Identifying,
            Reconnecting, Resuming,
        };

        match (self, next) {
            (FatallyClosed, _) => false,
            (_, FatallyClosed | Reconnecting) => true,
            (Disconnected | Reconnecting, Connecting)
            | (Connecting, AwaitingHello)
            | (AwaitingHello, Identifying | Resuming)
            | (Identifying | Resuming, Connected) => true,
            _ => false,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::FatallyClosed => "fatally_closed",
        }
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
