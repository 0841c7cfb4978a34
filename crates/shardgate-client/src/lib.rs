//! # shardgate-client
//!
//! Sharded client for a real-time gateway: one connection state machine per
//! shard, heartbeats, resume-or-reidentify recovery and dispatch routing.

pub mod backoff;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod protocol;
pub mod session;
pub mod shard;
pub mod transport;

pub use config::{GatewayConfig, HeartbeatJitter};
pub use connection::{ConnectionPhase, GatewayCommand, LifecycleListener, ShardHandle};
pub use dispatch::{handler_fn, DispatchEvent, DispatchRouter, EventHandler};
pub use error::{CommandError, DisconnectCause, FatalRejection, TransportError};
pub use protocol::{Envelope, Intents, OpCode};
pub use session::ShardInfo;
pub use shard::{CoordinatorEvent, HealthSummary, ShardCoordinator};
pub use transport::WebSocketConnector;
