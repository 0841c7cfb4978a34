//! Well-known dispatch event names
//!
//! Dispatch handlers are keyed by the raw `t` string, so any event the server
//! sends can be routed. The names below are the ones the connection itself
//! reacts to, plus the common guild/message events for convenience.

use std::fmt;

/// Event names found in the `t` field of dispatches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownEvent {
    /// Session established after Identify
    Ready,
    /// Session reattached after Resume
    Resumed,
    /// Guild became available or was joined
    GuildCreate,
    /// Guild left or became unavailable
    GuildDelete,
    /// Chunk of members answering a Request Guild Members command
    GuildMembersChunk,
    /// New message
    MessageCreate,
    /// User presence changed
    PresenceUpdate,
    /// Voice state changed
    VoiceStateUpdate,
}

impl KnownEvent {
    /// Wire name of the event
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Resumed => "RESUMED",
            Self::GuildCreate => "GUILD_CREATE",
            Self::GuildDelete => "GUILD_DELETE",
            Self::GuildMembersChunk => "GUILD_MEMBERS_CHUNK",
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::PresenceUpdate => "PRESENCE_UPDATE",
            Self::VoiceStateUpdate => "VOICE_STATE_UPDATE",
        }
    }

    /// Look up a wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "READY" => Some(Self::Ready),
            "RESUMED" => Some(Self::Resumed),
            "GUILD_CREATE" => Some(Self::GuildCreate),
            "GUILD_DELETE" => Some(Self::GuildDelete),
            "GUILD_MEMBERS_CHUNK" => Some(Self::GuildMembersChunk),
            "MESSAGE_CREATE" => Some(Self::MessageCreate),
            "PRESENCE_UPDATE" => Some(Self::PresenceUpdate),
            "VOICE_STATE_UPDATE" => Some(Self::VoiceStateUpdate),
            _ => None,
        }
    }

    /// Whether this event completes the handshake
    #[must_use]
    pub const fn completes_handshake(self) -> bool {
        matches!(self, Self::Ready | Self::Resumed)
    }
}

impl fmt::Display for KnownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<KnownEvent> for String {
    fn from(event: KnownEvent) -> Self {
        event.as_str().to_string()
    }
}
