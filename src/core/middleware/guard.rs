//! Deadline guard
//!
//! Races the rest of the chain against the route deadline and the client
//! disconnect signal. The handler runs on its own task and is never
//! stopped: when the guard loses patience it answers on the sink itself
//! (504 with a JSON body, or a bodyless 499) and leaves the handler to
//! finish in the background. Its later writes are dropped by the sink.
//!
//! Abandoned handlers are counted in [`Statistics::lingering_handlers`].
//! There is no hard cap on them; a warning is logged once the count goes
//! past the configured threshold.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use futures_util::FutureExt;
use serde_json::json;
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::core::pipeline::{Exchange, HandlerFuture, Next};
use crate::core::sink::{AbortReason, CLIENT_CLOSED_REQUEST};
use crate::core::Inbound;
use crate::observability::Statistics;

use super::recovery::panic_message;
use super::Middleware;

/// Path served with the long timeout on `GET`
pub const LONG_RUNNING_PATH: &str = "/v1/books";

const RUNNING: u8 = 0;
const COMPLETED: u8 = 1;
const TIMED_OUT: u8 = 2;
const CANCELLED: u8 = 3;

/// Per-route processing timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    default: Duration,
    long: Duration,
}

impl TimeoutPolicy {
    pub fn new(default: Duration, long: Duration) -> Self {
        Self { default, long }
    }

    /// Timeout for `request`: the long one for the full listing
    pub fn timeout_for(&self, request: &Inbound) -> Duration {
        if request.method == Method::GET && request.path == LONG_RUNNING_PATH {
            self.long
        } else {
            self.default
        }
    }
}

pub struct DeadlineGuard {
    timeouts: TimeoutPolicy,
    stats: Arc<Statistics>,
    max_lingering: u64,
}

enum Race {
    Finished(Result<std::thread::Result<()>, JoinError>),
    Expired(AbortReason),
}

impl DeadlineGuard {
    pub fn new(timeouts: TimeoutPolicy, stats: Arc<Statistics>, max_lingering: u64) -> Self {
        Self {
            timeouts,
            stats,
            max_lingering,
        }
    }

    fn abandon(&self, ex: &Exchange, reason: AbortReason, timeout: Duration) {
        let logger = &ex.ctx.logger;
        let request_id = &ex.ctx.request_id;

        let outcome = match reason {
            AbortReason::Cancelled => {
                let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                    .unwrap_or(StatusCode::BAD_REQUEST);
                ex.sink.finalize(reason, status, None)
            }
            AbortReason::TimedOut => {
                let body = json!({
                    "requestid": request_id,
                    "message": "request handling timed out",
                    "timeout": format!("{:.0} secs", timeout.as_secs_f64()),
                });
                ex.sink.finalize(
                    reason,
                    StatusCode::GATEWAY_TIMEOUT,
                    Some(body.to_string().as_bytes()),
                )
            }
        };

        match (reason, outcome) {
            (AbortReason::Cancelled, Ok(_)) => {
                logger.info("request cancelled by client", &[("request.id", request_id)]);
            }
            (AbortReason::TimedOut, Ok(_)) => {
                logger.warn(
                    "request handling timed out",
                    &[
                        ("request.id", request_id),
                        ("timeout", &format!("{}ms", timeout.as_millis())),
                    ],
                );
            }
            (_, Err(err)) => {
                logger.error(
                    "failed to send timeout response",
                    &[("request.id", request_id), ("error", &err.to_string())],
                );
            }
        }
    }
}

impl Middleware for DeadlineGuard {
    fn process<'a>(&'a self, mut ex: Exchange, next: Next) -> HandlerFuture<'a> {
        Box::pin(async move {
            let timeout = self.timeouts.timeout_for(&ex.request);
            let deadline = Instant::now() + timeout;
            ex.ctx.deadline = Some(deadline);

            let state = Arc::new(AtomicU8::new(RUNNING));
            let own = ex.clone();

            let mut task = {
                let state = Arc::clone(&state);
                let stats = Arc::clone(&self.stats);
                let logger = ex.ctx.logger.clone();
                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(next.run(ex)).catch_unwind().await;
                    if state
                        .compare_exchange(RUNNING, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        return outcome;
                    }

                    stats.abandoned_handler_finished();
                    match &outcome {
                        Ok(()) => logger.debug("abandoned handler finished", &[]),
                        Err(panic) => logger.error(
                            "abandoned handler panicked",
                            &[("error", &panic_message(panic.as_ref()))],
                        ),
                    }
                    Ok(())
                })
            };

            let race = tokio::select! {
                biased;
                joined = &mut task => Race::Finished(joined),
                _ = own.ctx.client_gone.cancelled() => Race::Expired(AbortReason::Cancelled),
                _ = tokio::time::sleep_until(deadline) => Race::Expired(AbortReason::TimedOut),
            };

            let joined = match race {
                Race::Finished(joined) => joined,
                Race::Expired(reason) => {
                    let next_state = match reason {
                        AbortReason::Cancelled => CANCELLED,
                        AbortReason::TimedOut => TIMED_OUT,
                    };
                    // count before the handler can observe the abandonment
                    let lingering = self.stats.handler_abandoned();
                    if state
                        .compare_exchange(RUNNING, next_state, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        if lingering > self.max_lingering {
                            own.ctx.logger.warn(
                                "abandoned handlers above threshold",
                                &[
                                    ("handlers.lingering", &lingering.to_string()),
                                    ("handlers.threshold", &self.max_lingering.to_string()),
                                ],
                            );
                        }
                        self.abandon(&own, reason, timeout);
                        return;
                    }
                    // handler completed in the meantime
                    self.stats.abandoned_handler_finished();
                    task.await
                }
            };

            match joined {
                Ok(Ok(())) => {}
                Ok(Err(panic)) => std::panic::resume_unwind(panic),
                Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
                Err(err) => own.ctx.logger.error(
                    "handler task failed",
                    &[("request.id", &own.ctx.request_id), ("error", &err.to_string())],
                ),
            }
        })
    }
}
