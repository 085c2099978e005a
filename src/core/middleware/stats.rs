//! Statistics on exit
//!
//! Records the status that actually went out once the rest of the
//! chain returns. A panic below is recorded as the 500 that recovery
//! further out will send, then keeps unwinding.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::FutureExt;

use crate::clock::Clock;
use crate::core::pipeline::{Exchange, HandlerFuture, Next};
use crate::observability::Statistics;

use super::Middleware;

pub struct StatsRecorder {
    stats: Arc<Statistics>,
    clock: Arc<dyn Clock>,
}

impl StatsRecorder {
    pub fn new(stats: Arc<Statistics>, clock: Arc<dyn Clock>) -> Self {
        Self { stats, clock }
    }
}

impl Middleware for StatsRecorder {
    fn process<'a>(&'a self, ex: Exchange, next: Next) -> HandlerFuture<'a> {
        Box::pin(async move {
            let logger = ex.ctx.logger.clone();
            let sink = ex.sink.clone();
            let start = self.clock.now();

            let outcome = AssertUnwindSafe(next.run(ex)).catch_unwind().await;

            let status = match &outcome {
                Err(_) if !sink.is_committed() => StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                _ => sink.status().as_u16(),
            };
            let elapsed = self.clock.now() - start;
            logger.info(
                "stats",
                &[
                    ("request.status", &status.to_string()),
                    ("bytes.sent", &sink.bytes().to_string()),
                    ("request.duration", &format!("{}ms", elapsed.num_milliseconds())),
                ],
            );
            self.stats.record_status(status);

            if let Err(panic) = outcome {
                std::panic::resume_unwind(panic);
            }
        })
    }
}
