//! Dispatch routing
//!
//! Delivers op-0 events to user handlers, isolated from the connection.

mod handler;
mod router;

pub use handler::{
    handler_fn, DispatchEvent, ErrorSink, EventHandler, FnHandler, HandlerFailure,
    TracingErrorSink,
};
pub use router::DispatchRouter;
