//! Gateway intents bitflags
//!
//! Intents select which groups of dispatch events the server sends to a shard.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Gateway intent flags sent with Identify
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Intents: u64 {
        /// Guild create/update/delete, role and channel events
        const GUILDS                   = 1 << 0;
        /// Member add/update/remove (privileged)
        const GUILD_MEMBERS            = 1 << 1;
        /// Ban add/remove
        const GUILD_MODERATION         = 1 << 2;
        /// Emoji and sticker updates
        const GUILD_EMOJIS_AND_STICKERS = 1 << 3;
        /// Integration updates
        const GUILD_INTEGRATIONS       = 1 << 4;
        /// Webhook updates
        const GUILD_WEBHOOKS           = 1 << 5;
        /// Invite create/delete
        const GUILD_INVITES            = 1 << 6;
        /// Voice state updates
        const GUILD_VOICE_STATES       = 1 << 7;
        /// Presence updates (privileged)
        const GUILD_PRESENCES          = 1 << 8;
        /// Guild message create/update/delete
        const GUILD_MESSAGES           = 1 << 9;
        /// Guild message reactions
        const GUILD_MESSAGE_REACTIONS  = 1 << 10;
        /// Guild typing start
        const GUILD_MESSAGE_TYPING     = 1 << 11;
        /// Direct message create/update/delete
        const DIRECT_MESSAGES          = 1 << 12;
        /// Direct message reactions
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Direct message typing start
        const DIRECT_MESSAGE_TYPING    = 1 << 14;
        /// Message content in message events (privileged)
        const MESSAGE_CONTENT          = 1 << 15;

        /// Intents that require explicit approval on the application
        const PRIVILEGED = Self::GUILD_MEMBERS.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::MESSAGE_CONTENT.bits();
    }
}

impl Intents {
    /// Whether any privileged intent is requested
    #[inline]
    pub fn is_privileged(self) -> bool {
        self.intersects(Self::PRIVILEGED)
    }

    /// Every non-privileged intent
    #[must_use]
    pub fn non_privileged() -> Self {
        Self::all().difference(Self::PRIVILEGED)
    }
}

impl Serialize for Intents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Self::from_bits_retain)
    }
}
