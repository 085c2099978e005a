//! # Bookstore Core Module
//!
//! Request lifecycle shared by every route: the middleware pipeline, the
//! typed request context, the write-once response sink and the deadline
//! guard.
//!
//! ## Design Principles
//!
//! - Context is threaded through the chain by value, never looked up
//! - Shared state (statistics, maintenance) is injected, never global
//! - Exactly one status line per response, whoever writes it

pub mod cancel;
pub mod context;
pub mod middleware;
pub mod pipeline;
pub mod sink;

pub use cancel::{CancelOnDrop, CancelSignal};
pub use context::{Inbound, RequestContext};
pub use middleware::{ops_stack, public_stack, Middleware, StackParts, TimeoutPolicy};
pub use pipeline::{compose, Exchange, Handler, HandlerFuture, Next, PipelineBuilder};
pub use sink::{
    AbortReason, BufferedResponse, ResponseSink, ResponseWriter, SinkError, ABORTED_HEADER,
    CLIENT_CLOSED_REQUEST, JSON_CONTENT_TYPE,
};
