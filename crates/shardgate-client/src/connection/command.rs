//! User commands sent through a shard

use crate::protocol::{Envelope, OpCode};
use serde_json::Value;

/// Outgoing command
///
/// Payloads are passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    /// op 3
    UpdatePresence(Value),
    /// op 4
    UpdateVoiceState(Value),
    /// op 8
    RequestGuildMembers(Value),
    /// Any other op code
    Raw { op: OpCode, d: Value },
}

impl GatewayCommand {
    #[must_use]
    pub const fn op(&self) -> OpCode {
        match self {
            Self::UpdatePresence(_) => OpCode::PresenceUpdate,
            Self::UpdateVoiceState(_) => OpCode::VoiceStateUpdate,
            Self::RequestGuildMembers(_) => OpCode::RequestGuildMembers,
            Self::Raw { op, .. } => *op,
        }
    }

    /// Wrap the command in an envelope
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let op = self.op();
        let d = match self {
            Self::UpdatePresence(d)
            | Self::UpdateVoiceState(d)
            | Self::RequestGuildMembers(d)
            | Self::Raw { d, .. } => d,
        };
        Envelope::new(op, d)
    }
}
