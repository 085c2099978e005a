//! Panic recovery
//!
//! Turns a panic anywhere below into a logged error and a 500 response.
//! The process keeps serving other requests.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::http::StatusCode;
use futures_util::FutureExt;
use serde_json::json;

use crate::core::pipeline::{Exchange, HandlerFuture, Next};

use super::Middleware;

pub struct PanicRecovery;

impl Middleware for PanicRecovery {
    fn process<'a>(&'a self, ex: Exchange, next: Next) -> HandlerFuture<'a> {
        Box::pin(async move {
            let request_id = ex.ctx.request_id.clone();
            let logger = ex.ctx.logger.clone();
            let sink = ex.sink.clone();

            let Err(panic) = AssertUnwindSafe(next.run(ex)).catch_unwind().await else {
                return;
            };

            logger.error(
                "panic occurred",
                &[("request.id", &request_id), ("error", &panic_message(panic.as_ref()))],
            );
            if sink.is_committed() {
                return;
            }

            let body = json!({
                "requestid": request_id,
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "message": "failed to process the request.",
                "data": {},
            });
            if let Err(err) = sink.write_json(StatusCode::INTERNAL_SERVER_ERROR, &body) {
                logger.error(
                    "failed to send error response",
                    &[("request.id", &request_id), ("error", &err.to_string())],
                );
            }
        })
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
