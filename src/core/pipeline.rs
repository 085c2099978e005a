//! Request Pipeline
//!
//! Composes an ordered list of middleware around a terminal handler.
//! Middleware run in list order on entry and unwind innermost-first.
//! The composed chain holds no per-request state, so one chain serves
//! any number of concurrent requests.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::context::{Inbound, RequestContext};
use super::middleware::Middleware;
use super::sink::ResponseSink;

/// Future returned by handlers and middleware
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// One request travelling through the chain
#[derive(Debug, Clone)]
pub struct Exchange {
    pub ctx: RequestContext,
    pub request: Arc<Inbound>,
    pub sink: ResponseSink,
}

impl Exchange {
    /// Bundle a request with its context and sink
    pub fn new(ctx: RequestContext, request: Inbound, sink: ResponseSink) -> Self {
        Self {
            ctx,
            request: Arc::new(request),
            sink,
        }
    }
}

/// Terminal request handler
pub trait Handler: Send + Sync {
    /// Serve the request, writing the outcome to `ex.sink`
    fn call<'a>(&'a self, ex: Exchange) -> HandlerFuture<'a>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Exchange) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn call<'a>(&'a self, ex: Exchange) -> HandlerFuture<'a> {
        Box::pin(self(ex))
    }
}

/// Rest of the chain, handed to each middleware
///
/// Owns its view of the chain, so the future it returns can be moved to
/// another task.
pub struct Next {
    middleware: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    handler: Arc<dyn Handler>,
}

impl Next {
    /// Run the next middleware, or the handler at the end of the chain
    pub fn run(self, ex: Exchange) -> HandlerFuture<'static> {
        Box::pin(async move {
            match self.middleware.get(self.index).cloned() {
                Some(current) => {
                    let next = Next {
                        middleware: Arc::clone(&self.middleware),
                        index: self.index + 1,
                        handler: Arc::clone(&self.handler),
                    };
                    current.process(ex, next).await
                }
                None => self.handler.call(ex).await,
            }
        })
    }
}

/// Handler wrapped by a non-empty middleware list
struct Chain {
    middleware: Arc<[Arc<dyn Middleware>]>,
    handler: Arc<dyn Handler>,
}

impl Handler for Chain {
    fn call<'a>(&'a self, ex: Exchange) -> HandlerFuture<'a> {
        Next {
            middleware: Arc::clone(&self.middleware),
            index: 0,
            handler: Arc::clone(&self.handler),
        }
        .run(ex)
    }
}

/// Wrap `handler` with `middleware`, first element outermost
///
/// An empty list returns `handler` itself.
pub fn compose(middleware: Vec<Arc<dyn Middleware>>, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
    if middleware.is_empty() {
        return handler;
    }
    Arc::new(Chain {
        middleware: middleware.into(),
        handler,
    })
}

/// Builder for middleware stacks
#[derive(Default)]
pub struct PipelineBuilder {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl PipelineBuilder {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware (runs after the ones already added)
    pub fn with(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(m));
        self
    }

    /// Number of stages so far
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Whether no stage was added
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wrap `handler` with the stack
    pub fn build(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        compose(self.middleware.clone(), handler)
    }
}
