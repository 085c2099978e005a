//! bookstore - a book catalogue service
//!
//! Requests run through a composed middleware pipeline with a per-request
//! deadline guard. Books live in a fast primary tier and are replicated
//! asynchronously into a durable, checksummed backup tier.

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod http_server;
pub mod ids;
pub mod observability;
pub mod replication;
pub mod storage;
