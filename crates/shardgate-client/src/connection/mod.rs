//! Connection management
//!
//! The per-shard state machine, its phases and the handle callers use to
//! drive it.

mod command;
mod controller;
mod handle;
mod lifecycle;
mod phase;

pub use command::GatewayCommand;
pub use controller::{ControllerContext, ShardController};
pub use handle::ShardHandle;
pub use lifecycle::{LifecycleListener, NoopListener};
pub use phase::ConnectionPhase;
