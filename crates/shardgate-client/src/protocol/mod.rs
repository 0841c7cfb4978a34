//! Gateway protocol definitions
//!
//! Op codes, the envelope format, close codes, payloads and the envelope codec.

pub mod codec;
mod close_codes;
mod events;
mod intents;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseCode, NORMAL_CLOSURE, RESUMABLE_CLOSURE};
pub use events::KnownEvent;
pub use intents::Intents;
pub use messages::Envelope;
pub use opcodes::OpCode;
pub use payloads::{HelloPayload, IdentifyPayload, IdentifyProperties, ReadyPayload, ResumePayload};
