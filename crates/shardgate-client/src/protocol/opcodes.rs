//! Gateway operation codes
//!
//! Defines the gateway op codes. Values the client does not know are kept as
//! [`OpCode::Unknown`] so a newer server never breaks decoding.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Gateway operation codes
///
/// Op codes define the type of message being sent or received over the gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// Server dispatches an event to the client (receive only)
    Dispatch,
    /// Heartbeat - keep connection alive (send/receive)
    Heartbeat,
    /// Identify - start a new session (send only)
    Identify,
    /// Presence Update - update the client's presence (send only)
    PresenceUpdate,
    /// Voice State Update - join, move or leave voice channels (send only)
    VoiceStateUpdate,
    /// Resume - reattach to a dropped session (send only)
    Resume,
    /// Reconnect - server asks the client to reconnect and resume (receive only)
    Reconnect,
    /// Request Guild Members - ask for member chunks (send only)
    RequestGuildMembers,
    /// Invalid Session - the session is invalid; payload says if resumable (receive only)
    InvalidSession,
    /// Hello - sent on connect with the heartbeat interval (receive only)
    Hello,
    /// Heartbeat ACK - heartbeat acknowledged (receive only)
    HeartbeatAck,
    /// Any op code this client does not know about
    Unknown(u64),
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    ///
    /// Never fails: unrecognised values map to [`OpCode::Unknown`].
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(value) => value,
        }
    }

    /// Check if this op code can be sent by the client
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::Identify
                | Self::PresenceUpdate
                | Self::VoiceStateUpdate
                | Self::Resume
                | Self::RequestGuildMembers
        )
    }

    /// Check if this op code can be sent by the server
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        matches!(
            self,
            Self::Dispatch
                | Self::Heartbeat
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }

    /// Get the name of this op code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::VoiceStateUpdate => "VoiceStateUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::RequestGuildMembers => "RequestGuildMembers",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl From<u64> for OpCode {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<OpCode> for u64 {
    fn from(op: OpCode) -> Self {
        op.as_u64()
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.as_u64())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self::from_u64)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_u64())
    }
}
