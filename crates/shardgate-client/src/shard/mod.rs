//! Sharding
//!
//! Runs N controllers under one coordinator with a shared identify gate and a
//! status registry.

mod coordinator;
mod gate;
mod registry;

pub use coordinator::{CoordinatorEvent, ShardCoordinator};
pub use gate::{IdentifyGate, IdentifyPermit};
pub use registry::{HealthSummary, RegistryWriter, ShardRegistry, ShardStatus};
