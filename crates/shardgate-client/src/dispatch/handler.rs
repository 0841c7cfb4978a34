//! Dispatch handler types

use crate::session::ShardInfo;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// A dispatch (op 0) as seen by handlers
#[derive(Debug, Clone)]
pub struct DispatchEvent {
    /// Shard the event arrived on
    pub shard: ShardInfo,
    /// Event name (`t`)
    pub name: String,
    /// Sequence number (`s`)
    pub sequence: Option<u64>,
    /// Event payload (`d`), untouched
    pub data: Arc<Value>,
}

/// Handles dispatches
///
/// Errors and panics are reported to the router's [`ErrorSink`] and never
/// affect the connection.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &DispatchEvent) -> anyhow::Result<()>;
}

/// Handler built from a closure, see [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as an [`EventHandler`]
///
/// The closure receives its own copy of the event.
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(DispatchEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(DispatchEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, event: &DispatchEvent) -> anyhow::Result<()> {
        (self.f)(event.clone()).await
    }
}

/// How a handler failed
#[derive(Debug)]
pub enum HandlerFailure {
    /// Handler returned an error
    Error(anyhow::Error),
    /// Handler panicked; holds the panic message when it was a string
    Panic(String),
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e:#}"),
            Self::Panic(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// Receives handler failures
pub trait ErrorSink: Send + Sync {
    fn report(&self, event: &DispatchEvent, failure: HandlerFailure);
}

/// Default sink: logs failures
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, event: &DispatchEvent, failure: HandlerFailure) {
        tracing::error!(
            shard_id = event.shard.id,
            event = %event.name,
            seq = ?event.sequence,
            error = %failure,
            "Dispatch handler failed"
        );
    }
}
