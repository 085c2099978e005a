//! # Bookstore HTTP Server Module
//!
//! axum glue around the request pipeline. Every route is dispatched into
//! its composed middleware chain on a spawned task.
//!
//! # Endpoints
//!
//! - `/`, `/status` - Status (public stack)
//! - `/v1/books`, `/v1/books/:id` - Book CRUD (public stack)
//! - `/ops/configs`, `/ops/stats`, `/ops/maintenance`, `/ops/cache` - Ops (ops stack)

pub mod book_routes;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod ops_routes;
pub mod response;
pub mod server;

pub use config::ServerConfig;
pub use dispatch::Mount;
pub use errors::{ErrorEnvelope, HttpError, HttpResult};
pub use response::Envelope;
pub use server::{build_router, AppState, HttpServer};
