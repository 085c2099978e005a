//! Observability and operational state
//!
//! This module provides:
//! - Structured logging (JSON lines, request-scoped fields)
//! - Request statistics (call counter, status histogram)
//! - The maintenance switch consulted by every public request
//!
//! # Usage
//!
//! ```ignore
//! use bookstore::observability::{Logger, Severity, Statistics};
//!
//! let logger = Logger::stdout(Severity::Info);
//! let scoped = logger.with(&[("request.id", "r:...")]);
//! scoped.info("stats", &[("request.status", "200")]);
//! ```

mod logger;
mod maintenance;
mod statistics;

pub use logger::{Logger, Severity};
pub use maintenance::{Maintenance, MaintenanceNotice, MAINTENANCE_MESSAGE};
pub use statistics::Statistics;
