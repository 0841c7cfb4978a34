//! Lifecycle notifications
//!
//! Controllers report what happens to their connection through a
//! [`LifecycleListener`]. Callbacks run inside the controller's event loop, so
//! implementations must be quick and must not block.

use super::ConnectionPhase;
use crate::error::{DisconnectCause, FatalRejection};
use crate::session::{SessionSnapshot, ShardInfo};
use std::time::Duration;

/// Observer of a shard's lifecycle
///
/// Every method has an empty default.
#[allow(unused_variables)]
pub trait LifecycleListener: Send + Sync {
    /// Phase changed
    fn on_phase(&self, shard: ShardInfo, phase: ConnectionPhase) {}

    /// Session identity or sequence changed
    fn on_session(&self, shard: ShardInfo, session: &SessionSnapshot) {}

    /// Heartbeat acknowledged
    fn on_heartbeat_ack(&self, shard: ShardInfo, latency: Option<Duration>) {}

    /// Connection lost, next attempt scheduled
    ///
    /// `attempt` counts consecutive attempts since the last completed handshake.
    fn on_reconnect_scheduled(
        &self,
        shard: ShardInfo,
        attempt: u32,
        delay: Duration,
        cause: &DisconnectCause,
    ) {
    }

    /// Shard stopped for good
    fn on_fatal(&self, shard: ShardInfo, rejection: &FatalRejection) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl LifecycleListener for NoopListener {}
