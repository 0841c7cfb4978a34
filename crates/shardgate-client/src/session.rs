//! Session state
//!
//! Everything needed to resume a dropped connection. Owned by exactly one
//! controller and only mutated from its event loop.

use crate::protocol::ResumePayload;
use serde::Serialize;

/// Identity of a shard within the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ShardInfo {
    /// Shard index, `0..count`
    pub id: u32,
    /// Total number of shards
    pub count: u32,
}

impl ShardInfo {
    #[must_use]
    pub const fn new(id: u32, count: u32) -> Self {
        Self { id, count }
    }

    /// Wire form used in Identify
    #[must_use]
    pub const fn as_array(self) -> [u32; 2] {
        [self.id, self.count]
    }
}

impl std::fmt::Display for ShardInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.id, self.count)
    }
}

/// Resumable session state of one shard
#[derive(Clone)]
pub struct SessionState {
    session_id: Option<String>,
    token: String,
    last_sequence: Option<u64>,
    shard: ShardInfo,
    reconnect_requested: bool,
    resume_url: Option<String>,
}

impl SessionState {
    /// Create an empty session (no session id, no sequence)
    #[must_use]
    pub fn new(token: impl Into<String>, shard: ShardInfo) -> Self {
        Self {
            session_id: None,
            token: token.into(),
            last_sequence: None,
            shard,
            reconnect_requested: false,
            resume_url: None,
        }
    }

    /// Record the sequence number of a dispatch
    ///
    /// The stored value never decreases; stale or replayed numbers are ignored.
    pub fn record_dispatch(&mut self, seq: u64) {
        match self.last_sequence {
            Some(last) if seq <= last => {
                tracing::debug!(
                    shard_id = self.shard.id,
                    seq = seq,
                    last_sequence = last,
                    "Ignoring stale sequence number"
                );
            }
            _ => self.last_sequence = Some(seq),
        }
    }

    /// Store the identity handed out by READY
    pub fn capture_identity(&mut self, session_id: impl Into<String>, resume_url: Option<String>) {
        self.session_id = Some(session_id.into());
        self.resume_url = resume_url;
    }

    /// Drop everything that would allow a resume
    pub fn invalidate(&mut self) {
        self.session_id = None;
        self.last_sequence = None;
        self.resume_url = None;
    }

    /// Remember that the server asked for a reconnect
    pub fn request_reconnect(&mut self) {
        self.reconnect_requested = true;
    }

    /// Consume the reconnect request flag
    pub fn take_reconnect_request(&mut self) -> bool {
        std::mem::take(&mut self.reconnect_requested)
    }

    /// Resume payload, present iff a session can be resumed
    #[must_use]
    pub fn resume_payload(&self) -> Option<ResumePayload> {
        self.session_id.as_ref().map(|session_id| ResumePayload {
            token: self.token.clone(),
            session_id: session_id.clone(),
            seq: self.last_sequence,
        })
    }

    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some()
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    pub const fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    #[must_use]
    pub const fn shard(&self) -> ShardInfo {
        self.shard
    }

    #[must_use]
    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// Token-free copy for monitoring
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            last_sequence: self.last_sequence,
            shard: self.shard,
            resume_url: self.resume_url.clone(),
        }
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session_id", &self.session_id)
            .field("token", &"<redacted>")
            .field("last_sequence", &self.last_sequence)
            .field("shard", &self.shard)
            .field("reconnect_requested", &self.reconnect_requested)
            .field("resume_url", &self.resume_url)
            .finish()
    }
}

/// Session state as published to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<String>,
    pub last_sequence: Option<u64>,
    pub shard: ShardInfo,
    pub resume_url: Option<String>,
}
