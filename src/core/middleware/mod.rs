//! Middleware Traits and Implementations
//!
//! Middleware stages for the request pipeline, and the two stacks the
//! server mounts: public routes and ops routes.

use std::sync::Arc;

use crate::clock::Clock;
use crate::ids::IdGenerator;
use crate::observability::{Maintenance, Statistics};

use super::pipeline::{Exchange, HandlerFuture, Next, PipelineBuilder};

/// Middleware trait for pipeline stages
pub trait Middleware: Send + Sync {
    /// Process the request, optionally updating its context, then
    /// either call `next` or answer on the sink directly
    fn process<'a>(&'a self, ex: Exchange, next: Next) -> HandlerFuture<'a>;
}

/// Composable middleware implementations
pub mod cors;
pub mod guard;
pub mod maintenance;
pub mod recovery;
pub mod stats;
pub mod tagging;

pub use cors::Cors;
pub use guard::{DeadlineGuard, TimeoutPolicy};
pub use maintenance::MaintenanceGate;
pub use recovery::PanicRecovery;
pub use stats::StatsRecorder;
pub use tagging::{RequestCounter, RequestId, ScopedLogger};

/// Shared state the stacks are built from
#[derive(Clone)]
pub struct StackParts {
    pub ids: Arc<dyn IdGenerator>,
    pub clock: Arc<dyn Clock>,
    pub stats: Arc<Statistics>,
    pub maintenance: Arc<Maintenance>,
    pub timeouts: TimeoutPolicy,
    pub max_lingering_handlers: u64,
}

/// Stack for public routes
///
/// request id, panic recovery, maintenance gate, counter, scoped logger,
/// CORS, deadline guard, statistics.
pub fn public_stack(parts: &StackParts) -> PipelineBuilder {
    build_stack(parts, true)
}

/// Stack for ops routes: the public one without the maintenance gate
pub fn ops_stack(parts: &StackParts) -> PipelineBuilder {
    build_stack(parts, false)
}

fn build_stack(parts: &StackParts, gated: bool) -> PipelineBuilder {
    let mut stack = PipelineBuilder::new()
        .with(RequestId::new(Arc::clone(&parts.ids)))
        .with(PanicRecovery);
    if gated {
        stack = stack.with(MaintenanceGate::new(Arc::clone(&parts.maintenance)));
    }
    stack
        .with(RequestCounter::new(Arc::clone(&parts.stats)))
        .with(ScopedLogger)
        .with(Cors)
        .with(DeadlineGuard::new(
            parts.timeouts.clone(),
            Arc::clone(&parts.stats),
            parts.max_lingering_handlers,
        ))
        .with(StatsRecorder::new(Arc::clone(&parts.stats), Arc::clone(&parts.clock)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::clock::SystemClock;
    use crate::ids::UuidGenerator;

    fn parts() -> StackParts {
        StackParts {
            ids: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
            stats: Arc::new(Statistics::new(Utc::now())),
            maintenance: Arc::new(Maintenance::new()),
            timeouts: TimeoutPolicy::new(Duration::from_secs(1), Duration::from_secs(5)),
            max_lingering_handlers: 8,
        }
    }

    #[test]
    fn test_stack_sizes() {
        let parts = parts();
        assert_eq!(public_stack(&parts).len(), 8);
        assert_eq!(ops_stack(&parts).len(), 7);
    }
}
