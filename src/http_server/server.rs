//! # HTTP Server
//!
//! Binds every route to its pipeline and serves the router.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Request;
use axum::routing::{self, MethodFilter, MethodRouter};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::core::{ops_stack, public_stack, Exchange, Handler, PipelineBuilder, StackParts};
use crate::ids::IdGenerator;
use crate::observability::{Logger, Maintenance, Statistics};
use crate::storage::BookService;

use super::book_routes::{create_book, delete_book, get_all_books, get_one_book, update_book};
use super::dispatch::{payload_too_large, Mount};
use super::ops_routes::{clear_cache, configs, index, maintenance, not_found, statistics, status};

/// Shared state handed to every route handler
pub struct AppState {
    pub config: AppConfig,
    pub logger: Logger,
    pub service: Arc<BookService>,
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<Statistics>,
    pub maintenance: Arc<Maintenance>,
}

impl AppState {
    /// Parts the middleware stacks are built from
    pub fn stack_parts(&self) -> StackParts {
        StackParts {
            ids: Arc::clone(&self.ids),
            clock: Arc::clone(&self.clock),
            stats: Arc::clone(&self.stats),
            maintenance: Arc::clone(&self.maintenance),
            timeouts: self.config.server.timeout_policy(),
            max_lingering_handlers: self.config.server.max_lingering_handlers,
        }
    }
}

/// Wrap a route function as a pipeline handler bound to `state`
fn bind<F, Fut>(state: &Arc<AppState>, route: F) -> Arc<dyn Handler>
where
    F: Fn(Arc<AppState>, Exchange) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let state = Arc::clone(state);
    Arc::new(move |ex: Exchange| route(Arc::clone(&state), ex))
}

struct Routes {
    state: Arc<AppState>,
    public: PipelineBuilder,
    ops: PipelineBuilder,
}

impl Routes {
    fn mount(&self, stack: &PipelineBuilder, handler: Arc<dyn Handler>) -> Mount {
        Mount::new(
            stack.build(handler),
            stack.build(Arc::new(payload_too_large)),
            self.state.logger.clone(),
            self.state.config.server.max_body_bytes,
        )
    }

    fn public<F, Fut>(&self, route: F) -> Mount
    where
        F: Fn(Arc<AppState>, Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.mount(&self.public, bind(&self.state, route))
    }

    fn ops<F, Fut>(&self, route: F) -> Mount
    where
        F: Fn(Arc<AppState>, Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.mount(&self.ops, bind(&self.state, route))
    }
}

fn on(filter: MethodFilter, mount: Mount) -> MethodRouter {
    routing::on(filter, move |req: Request| mount.serve(req))
}

/// Build the router with every route behind its pipeline
pub fn build_router(state: Arc<AppState>) -> Router {
    let parts = state.stack_parts();
    let routes = Routes {
        public: public_stack(&parts),
        ops: ops_stack(&parts),
        state: Arc::clone(&state),
    };
    let fallback = routes.public(not_found);

    Router::new()
        .route("/", on(MethodFilter::GET, routes.public(index)))
        .route("/status", on(MethodFilter::GET, routes.public(status)))
        .route(
            "/v1/books",
            on(MethodFilter::GET, routes.public(get_all_books))
                .merge(on(MethodFilter::POST, routes.public(create_book))),
        )
        .route(
            "/v1/books/:id",
            on(MethodFilter::GET, routes.public(get_one_book))
                .merge(on(MethodFilter::PUT, routes.public(update_book)))
                .merge(on(MethodFilter::DELETE, routes.public(delete_book))),
        )
        .route("/ops/configs", on(MethodFilter::GET, routes.ops(configs)))
        .route("/ops/stats", on(MethodFilter::GET, routes.ops(statistics)))
        .route("/ops/maintenance", on(MethodFilter::GET, routes.ops(maintenance)))
        .route("/ops/cache", on(MethodFilter::DELETE, routes.ops(clear_cache)))
        .fallback(move |req: Request| fallback.serve(req))
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
}

/// HTTP server for the book store
pub struct HttpServer {
    addr: String,
    router: Router,
    logger: Logger,
}

impl HttpServer {
    /// Create a server for `state`
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            addr: state.config.server.socket_addr(),
            logger: state.logger.clone(),
            router: build_router(state),
        }
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> &str {
        &self.addr
    }

    /// Get the router (for testing)
    pub fn router(self) -> Router {
        self.router
    }

    /// Serve until `shutdown` resolves, then drain in-flight connections
    pub async fn start<S>(self, shutdown: S) -> Result<(), std::io::Error>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await?;
        let local = listener.local_addr()?;
        self.logger
            .info("http server listening", &[("addr", &local.to_string())]);

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
    }
}
