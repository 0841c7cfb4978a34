//! Shard coordinator
//!
//! Owns one controller per shard. Controllers recover on their own; the
//! coordinator only staggers their identifies, keeps the registry and raises
//! the events a supervisor has to act on.

use super::{HealthSummary, IdentifyGate, RegistryWriter, ShardRegistry};
use crate::config::GatewayConfig;
use crate::connection::{
    ConnectionPhase, ControllerContext, LifecycleListener, ShardController, ShardHandle,
};
use crate::dispatch::DispatchRouter;
use crate::error::{DisconnectCause, FatalRejection};
use crate::session::{SessionSnapshot, ShardInfo};
use crate::transport::Connector;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

/// Something a supervisor should know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// The gateway rejected a shard; it will not come back on its own
    ShardFatal {
        shard_id: u32,
        rejection: FatalRejection,
    },
    /// A shard keeps failing to reconnect
    ///
    /// Raised each time its consecutive attempts reach a multiple of
    /// `alert_after_attempts`. The shard keeps retrying.
    ShardStruggling {
        shard_id: u32,
        attempts: u32,
        cause: DisconnectCause,
    },
}

/// Feeds the registry and escalates
struct CoordinatorListener {
    registry: RegistryWriter,
    events: mpsc::Sender<CoordinatorEvent>,
    alert_after_attempts: u32,
}

impl CoordinatorListener {
    fn escalate(&self, event: CoordinatorEvent) {
        if let Err(e) = self.events.try_send(event) {
            tracing::warn!(error = %e, "Coordinator event dropped");
        }
    }
}

impl LifecycleListener for CoordinatorListener {
    fn on_phase(&self, shard: ShardInfo, phase: ConnectionPhase) {
        self.registry.on_phase(shard, phase);
    }

    fn on_session(&self, shard: ShardInfo, session: &SessionSnapshot) {
        self.registry.on_session(shard, session);
    }

    fn on_heartbeat_ack(&self, shard: ShardInfo, latency: Option<Duration>) {
        self.registry.on_heartbeat_ack(shard, latency);
    }

    fn on_reconnect_scheduled(
        &self,
        shard: ShardInfo,
        attempt: u32,
        delay: Duration,
        cause: &DisconnectCause,
    ) {
        self.registry
            .on_reconnect_scheduled(shard, attempt, delay, cause);

        if self.alert_after_attempts > 0 && attempt % self.alert_after_attempts == 0 {
            tracing::error!(
                shard_id = shard.id,
                attempts = attempt,
                cause = %cause,
                "Shard keeps failing to reconnect"
            );
            self.escalate(CoordinatorEvent::ShardStruggling {
                shard_id: shard.id,
                attempts: attempt,
                cause: cause.clone(),
            });
        }
    }

    fn on_fatal(&self, shard: ShardInfo, rejection: &FatalRejection) {
        self.registry.on_fatal(shard, rejection);

        // A requested shutdown is not news to the supervisor
        if matches!(rejection, FatalRejection::Rejected { .. }) {
            self.escalate(CoordinatorEvent::ShardFatal {
                shard_id: shard.id,
                rejection: rejection.clone(),
            });
        }
    }
}

/// Runs every shard of one application
pub struct ShardCoordinator {
    config: Arc<GatewayConfig>,
    connector: Arc<dyn Connector>,
    router: Arc<DispatchRouter>,
    gate: IdentifyGate,
    registry: Arc<ShardRegistry>,
    shards: Vec<ShardHandle>,
    generation: u64,
}

impl ShardCoordinator {
    #[must_use]
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        router: Arc<DispatchRouter>,
    ) -> Self {
        let gate = IdentifyGate::new(config.identify_interval);
        Self {
            config: Arc::new(config),
            connector,
            router,
            gate,
            registry: Arc::new(ShardRegistry::new()),
            shards: Vec::new(),
            generation: 0,
        }
    }

    /// Spawn a controller for every shard id `0..shard_count`
    ///
    /// Shards identify in id order, spaced by the identify interval. Calling
    /// `start` again drops, and thereby stops, the previous set of shards;
    /// their remaining callbacks no longer touch the registry.
    pub fn start(&mut self) -> mpsc::Receiver<CoordinatorEvent> {
        self.generation += 1;
        let generation = self.generation;

        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let listener: Arc<dyn LifecycleListener> = Arc::new(CoordinatorListener {
            registry: self.registry.writer(generation),
            events: events_tx,
            alert_after_attempts: self.config.alert_after_attempts,
        });

        let count = self.config.shard_count;
        tracing::info!(
            shard_count = count,
            generation = generation,
            identify_interval_ms = u64::try_from(self.gate.interval().as_millis()).unwrap_or(u64::MAX),
            "Starting shards"
        );

        self.shards = (0..count)
            .map(|id| {
                let shard = ShardInfo::new(id, count);
                self.registry.insert(shard, generation);
                let ctx = ControllerContext {
                    config: Arc::clone(&self.config),
                    connector: Arc::clone(&self.connector),
                    router: Arc::clone(&self.router),
                    gate: self.gate.clone(),
                    listener: Arc::clone(&listener),
                };
                ShardController::spawn(shard, ctx)
            })
            .collect();

        events_rx
    }

    /// Handle of one shard
    pub fn shard(&self, shard_id: u32) -> Option<&ShardHandle> {
        self.shards.get(shard_id as usize)
    }

    /// Handles of every running shard, in id order
    pub fn shards(&self) -> &[ShardHandle] {
        &self.shards
    }

    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    pub fn health(&self) -> HealthSummary {
        self.registry.health()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stop every shard and wait for all of them
    pub async fn shutdown(&self) {
        tracing::info!(shard_count = self.shards.len(), "Shutting down shards");
        for shard in &self.shards {
            shard.request_shutdown();
        }
        join_all(self.shards.iter().map(|shard| shard.shutdown())).await;
    }
}

impl std::fmt::Debug for ShardCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardCoordinator")
            .field("config", &self.config)
            .field("shards", &self.shards.len())
            .field("health", &self.registry.health())
            .finish()
    }
}
