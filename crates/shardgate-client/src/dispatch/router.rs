//! Dispatch router
//!
//! Routes op-0 envelopes to the handlers registered for their event name.

use super::handler::{DispatchEvent, ErrorSink, EventHandler, HandlerFailure, TracingErrorSink};
use crate::protocol::Envelope;
use crate::session::ShardInfo;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

struct Route {
    /// `None` matches every event
    event: Option<String>,
    handler: Arc<dyn EventHandler>,
}

/// Routes dispatches to registered handlers
///
/// Handlers run sequentially, in the order they were registered, regardless of
/// whether they were registered by name or as wildcards. Shared by all shards.
pub struct DispatchRouter {
    routes: RwLock<Vec<Route>>,
    errors: Arc<dyn ErrorSink>,
}

impl DispatchRouter {
    /// Create a router that logs handler failures
    #[must_use]
    pub fn new() -> Self {
        Self::with_error_sink(Arc::new(TracingErrorSink))
    }

    /// Create a router with a custom failure sink
    #[must_use]
    pub fn with_error_sink(errors: Arc<dyn ErrorSink>) -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
            errors,
        }
    }

    /// Register a handler for one event name
    pub fn register(&self, event: impl Into<String>, handler: impl EventHandler + 'static) {
        self.register_arc(Some(event.into()), Arc::new(handler));
    }

    /// Register a handler for every event
    pub fn register_any(&self, handler: impl EventHandler + 'static) {
        self.register_arc(None, Arc::new(handler));
    }

    /// Register an already shared handler (`None` for every event)
    pub fn register_arc(&self, event: Option<String>, handler: Arc<dyn EventHandler>) {
        tracing::debug!(event = event.as_deref().unwrap_or("*"), "Registered dispatch handler");
        self.routes.write().push(Route { event, handler });
    }

    /// Number of registered handlers
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.routes.read().len()
    }

    /// Route a dispatch envelope to its handlers
    ///
    /// Returns how many handlers ran. Non-dispatch envelopes are ignored.
    pub async fn route(&self, shard: ShardInfo, envelope: &Envelope) -> usize {
        let Some(name) = envelope.event_name() else {
            return 0;
        };

        // Clone the matching handlers so the lock is not held across awaits
        let handlers: Vec<Arc<dyn EventHandler>> = self
            .routes
            .read()
            .iter()
            .filter(|route| route.event.as_deref().map_or(true, |event| event == name))
            .map(|route| Arc::clone(&route.handler))
            .collect();

        if handlers.is_empty() {
            tracing::trace!(shard_id = shard.id, event = %name, "No handler for dispatch");
            return 0;
        }

        let event = DispatchEvent {
            shard,
            name: name.to_string(),
            sequence: envelope.s,
            data: Arc::new(envelope.d.clone()),
        };

        for handler in &handlers {
            let outcome = AssertUnwindSafe(handler.handle(&event)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => self.errors.report(&event, HandlerFailure::Error(e)),
                Err(panic) => self
                    .errors
                    .report(&event, HandlerFailure::Panic(panic_message(&*panic))),
            }
        }

        handlers.len()
    }
}

impl Default for DispatchRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::handler_fn;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        failures: Mutex<Vec<String>>,
    }

    impl ErrorSink for RecordingSink {
        fn report(&self, event: &DispatchEvent, failure: HandlerFailure) {
            self.failures.lock().push(format!("{}: {failure}", event.name));
        }
    }

    struct Exploding;

    #[async_trait::async_trait]
    impl EventHandler for Exploding {
        async fn handle(&self, _event: &DispatchEvent) -> anyhow::Result<()> {
            panic!("handler exploded")
        }
    }

    fn shard() -> ShardInfo {
        ShardInfo::new(0, 1)
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl EventHandler {
        let log = Arc::clone(log);
        handler_fn(move |event: DispatchEvent| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{tag}:{}", event.name));
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_routes_by_name_in_registration_order() {
        let router = DispatchRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        router.register("MESSAGE_CREATE", recorder(&log, "a"));
        router.register_any(recorder(&log, "any"));
        router.register("MESSAGE_CREATE", recorder(&log, "b"));
        router.register("GUILD_CREATE", recorder(&log, "guild"));

        let ran = router
            .route(shard(), &Envelope::dispatch("MESSAGE_CREATE", 1, serde_json::json!({})))
            .await;

        assert_eq!(ran, 3);
        assert_eq!(
            *log.lock(),
            vec!["a:MESSAGE_CREATE", "any:MESSAGE_CREATE", "b:MESSAGE_CREATE"]
        );
    }

    #[tokio::test]
    async fn test_unhandled_event_is_dropped() {
        let router = DispatchRouter::new();
        let ran = router
            .route(shard(), &Envelope::dispatch("TYPING_START", 1, serde_json::json!({})))
            .await;
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn test_non_dispatch_is_ignored() {
        let router = DispatchRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        router.register_any(recorder(&log, "any"));

        assert_eq!(router.route(shard(), &Envelope::heartbeat_ack()).await, 0);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_errors_and_panics_reach_sink_and_later_handlers_run() {
        let sink = Arc::new(RecordingSink::default());
        let router = DispatchRouter::with_error_sink(sink.clone());
        let log = Arc::new(Mutex::new(Vec::new()));

        router.register(
            "READY",
            handler_fn(|_| async { Err(anyhow::anyhow!("handler broke")) }),
        );
        router.register("READY", Exploding);
        router.register("READY", recorder(&log, "after"));

        let ran = router
            .route(shard(), &Envelope::dispatch("READY", 1, serde_json::json!({})))
            .await;

        assert_eq!(ran, 3);
        assert_eq!(*log.lock(), vec!["after:READY"]);

        let failures = sink.failures.lock();
        assert_eq!(failures.len(), 2);
        assert!(failures[0].contains("handler broke"));
        assert!(failures[1].contains("handler exploded"));
    }

    #[tokio::test]
    async fn test_handler_sees_payload_and_shard() {
        let router = DispatchRouter::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);

        router.register(
            "GUILD_CREATE",
            handler_fn(move |event: DispatchEvent| {
                let seen = Arc::clone(&seen_clone);
                async move {
                    *seen.lock() = Some((event.shard, event.sequence, event.data["id"].clone()));
                    Ok(())
                }
            }),
        );

        router
            .route(
                ShardInfo::new(3, 4),
                &Envelope::dispatch("GUILD_CREATE", 9, serde_json::json!({"id": "42"})),
            )
            .await;

        let (shard, seq, id) = seen.lock().clone().unwrap();
        assert_eq!(shard, ShardInfo::new(3, 4));
        assert_eq!(seq, Some(9));
        assert_eq!(id, "42");
    }
}
