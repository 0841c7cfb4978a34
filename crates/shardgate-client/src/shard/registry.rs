//! Shard registry
//!
//! Read-mostly status table for every shard of a coordinator. Controllers
//! write to it through a [`RegistryWriter`] bound to the generation of shards
//! they belong to; everyone else takes snapshots. Writes from a replaced
//! generation are ignored, so a stopping controller cannot overwrite the
//! entry of the one that took its place.

use crate::connection::{ConnectionPhase, LifecycleListener};
use crate::error::{DisconnectCause, FatalRejection};
use crate::session::{SessionSnapshot, ShardInfo};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Last known state of one shard
#[derive(Debug, Clone, Serialize)]
pub struct ShardStatus {
    pub shard: ShardInfo,
    /// Which start of the coordinator this entry belongs to
    pub generation: u64,
    pub phase: ConnectionPhase,
    /// Token-free session state, `None` until the first session event
    pub session: Option<SessionSnapshot>,
    /// Consecutive reconnect attempts since the last completed handshake
    pub reconnect_attempts: u32,
    /// Round trip of the last acknowledged heartbeat
    pub latency_ms: Option<u64>,
    pub last_disconnect: Option<String>,
    pub fatal_reason: Option<String>,
    pub connected_since: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl ShardStatus {
    #[must_use]
    pub fn new(shard: ShardInfo, generation: u64) -> Self {
        Self {
            shard,
            generation,
            phase: ConnectionPhase::Disconnected,
            session: None,
            reconnect_attempts: 0,
            latency_ms: None,
            last_disconnect: None,
            fatal_reason: None,
            connected_since: None,
            updated_at: Utc::now(),
        }
    }
}

/// Shard counts per phase group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub total: usize,
    pub connected: usize,
    /// Connecting or in the middle of a handshake
    pub connecting: usize,
    pub reconnecting: usize,
    pub fatally_closed: usize,
    pub disconnected: usize,
}

impl HealthSummary {
    /// Whether every shard has a live session
    #[must_use]
    pub const fn all_connected(&self) -> bool {
        self.total > 0 && self.connected == self.total
    }

    fn count(&mut self, phase: ConnectionPhase) {
        self.total += 1;
        match phase {
            ConnectionPhase::Connected => self.connected += 1,
            ConnectionPhase::Connecting
            | ConnectionPhase::AwaitingHello
            | ConnectionPhase::Identifying
            | ConnectionPhase::Resuming => self.connecting += 1,
            ConnectionPhase::Reconnecting => self.reconnecting += 1,
            ConnectionPhase::FatallyClosed => self.fatally_closed += 1,
            ConnectionPhase::Disconnected => self.disconnected += 1,
        }
    }
}

/// Status of every shard, ordered by shard id
#[derive(Debug, Default)]
pub struct ShardRegistry {
    shards: RwLock<BTreeMap<u32, ShardStatus>>,
}

impl ShardRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a shard, resetting any previous status
    pub fn insert(&self, shard: ShardInfo, generation: u64) {
        self.shards
            .write()
            .insert(shard.id, ShardStatus::new(shard, generation));
    }

    /// Listener that records lifecycle callbacks for one generation
    #[must_use]
    pub fn writer(self: &Arc<Self>, generation: u64) -> RegistryWriter {
        RegistryWriter {
            registry: Arc::clone(self),
            generation,
        }
    }

    /// Status of one shard
    pub fn get(&self, shard_id: u32) -> Option<ShardStatus> {
        self.shards.read().get(&shard_id).cloned()
    }

    /// Status of every shard
    pub fn snapshot(&self) -> Vec<ShardStatus> {
        self.shards.read().values().cloned().collect()
    }

    pub fn health(&self) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for status in self.shards.read().values() {
            summary.count(status.phase);
        }
        summary
    }

    pub fn len(&self) -> usize {
        self.shards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.read().is_empty()
    }

    fn update(&self, shard: ShardInfo, generation: u64, apply: impl FnOnce(&mut ShardStatus)) {
        let mut shards = self.shards.write();
        let status = shards
            .entry(shard.id)
            .or_insert_with(|| ShardStatus::new(shard, generation));
        if status.generation != generation {
            tracing::trace!(
                shard_id = shard.id,
                generation = generation,
                current = status.generation,
                "Ignoring update from a replaced shard"
            );
            return;
        }
        apply(status);
        status.updated_at = Utc::now();
    }
}

/// Writes one generation's lifecycle callbacks into a [`ShardRegistry`]
#[derive(Debug, Clone)]
pub struct RegistryWriter {
    registry: Arc<ShardRegistry>,
    generation: u64,
}

impl RegistryWriter {
    fn update(&self, shard: ShardInfo, apply: impl FnOnce(&mut ShardStatus)) {
        self.registry.update(shard, self.generation, apply);
    }
}

impl LifecycleListener for RegistryWriter {
    fn on_phase(&self, shard: ShardInfo, phase: ConnectionPhase) {
        self.update(shard, |status| {
            status.phase = phase;
            if phase == ConnectionPhase::Connected {
                status.reconnect_attempts = 0;
                status.connected_since = Some(Utc::now());
            } else {
                status.connected_since = None;
            }
        });
    }

    fn on_session(&self, shard: ShardInfo, session: &SessionSnapshot) {
        self.update(shard, |status| status.session = Some(session.clone()));
    }

    fn on_heartbeat_ack(&self, shard: ShardInfo, latency: Option<Duration>) {
        if let Some(latency) = latency {
            let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            self.update(shard, |status| status.latency_ms = Some(latency_ms));
        }
    }

    fn on_reconnect_scheduled(
        &self,
        shard: ShardInfo,
        attempt: u32,
        _delay: Duration,
        cause: &DisconnectCause,
    ) {
        self.update(shard, |status| {
            status.reconnect_attempts = attempt;
            status.last_disconnect = Some(cause.to_string());
        });
    }

    fn on_fatal(&self, shard: ShardInfo, rejection: &FatalRejection) {
        self.update(shard, |status| status.fatal_reason = Some(rejection.to_string()));
    }
}
