//! Maintenance gate
//!
//! Short-circuits public traffic with a 503 while maintenance is on.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::core::pipeline::{Exchange, HandlerFuture, Next};
use crate::observability::Maintenance;

use super::Middleware;

pub struct MaintenanceGate {
    maintenance: Arc<Maintenance>,
}

impl MaintenanceGate {
    pub fn new(maintenance: Arc<Maintenance>) -> Self {
        Self { maintenance }
    }
}

impl Middleware for MaintenanceGate {
    fn process<'a>(&'a self, ex: Exchange, next: Next) -> HandlerFuture<'a> {
        if !self.maintenance.is_enabled() {
            return next.run(ex);
        }

        let notice = self.maintenance.notice();
        Box::pin(async move {
            if let Err(err) = ex.sink.write_json(StatusCode::SERVICE_UNAVAILABLE, &notice) {
                ex.ctx.logger.error(
                    "failed to send maintenance response",
                    &[("request.id", &ex.ctx.request_id), ("error", &err.to_string())],
                );
            }
        })
    }
}
