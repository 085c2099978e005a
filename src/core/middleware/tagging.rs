//! Request tagging
//!
//! Request id, request sequence number and the request-scoped logger.

use std::sync::Arc;

use crate::core::pipeline::{Exchange, HandlerFuture, Next};
use crate::ids::{IdGenerator, REQUEST_ID_PREFIX};
use crate::observability::Statistics;

use super::Middleware;

/// Assigns a fresh `r:<uuid>` request id
pub struct RequestId {
    ids: Arc<dyn IdGenerator>,
}

impl RequestId {
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self { ids }
    }
}

impl Middleware for RequestId {
    fn process<'a>(&'a self, mut ex: Exchange, next: Next) -> HandlerFuture<'a> {
        ex.ctx.request_id = self.ids.generate(REQUEST_ID_PREFIX);
        next.run(ex)
    }
}

/// Counts the call and keeps the new total as the request number
pub struct RequestCounter {
    stats: Arc<Statistics>,
}

impl RequestCounter {
    pub fn new(stats: Arc<Statistics>) -> Self {
        Self { stats }
    }
}

impl Middleware for RequestCounter {
    fn process<'a>(&'a self, mut ex: Exchange, next: Next) -> HandlerFuture<'a> {
        ex.ctx.request_number = self.stats.increment_calls();
        next.run(ex)
    }
}

/// Binds the request fields to the context logger
pub struct ScopedLogger;

impl Middleware for ScopedLogger {
    fn process<'a>(&'a self, mut ex: Exchange, next: Next) -> HandlerFuture<'a> {
        let number = ex.ctx.request_number.to_string();
        let ip = ex.request.source_ip();
        let request = Arc::clone(&ex.request);
        ex.ctx.logger = ex.ctx.logger.with(&[
            ("request.id", &ex.ctx.request_id),
            ("request.number", &number),
            ("request.method", request.method.as_str()),
            ("request.path", &request.path),
            ("request.ip", &ip),
            ("request.agent", request.user_agent()),
            ("request.referer", request.referer()),
        ]);
        next.run(ex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use axum::http::{header, HeaderValue, Method};
    use chrono::Utc;

    use crate::core::cancel::CancelSignal;
    use crate::core::context::{Inbound, RequestContext};
    use crate::core::pipeline::{compose, Handler};
    use crate::core::sink::{BufferedResponse, ResponseSink};
    use crate::ids::UuidGenerator;
    use crate::observability::{Logger, Severity};

    fn capture(seen: Arc<Mutex<Option<Exchange>>>) -> Arc<dyn Handler> {
        Arc::new(move |ex: Exchange| {
            let seen = Arc::clone(&seen);
            async move {
                ex.ctx.logger.info("handled", &[]);
                *seen.lock().unwrap() = Some(ex);
            }
        })
    }

    #[tokio::test]
    async fn test_tagging_fills_context() {
        let logger = Logger::memory(Severity::Debug);
        let stats = Arc::new(Statistics::new(Utc::now()));
        stats.increment_calls();

        let seen = Arc::new(Mutex::new(None));
        let chain = compose(
            vec![
                Arc::new(RequestId::new(Arc::new(UuidGenerator))),
                Arc::new(RequestCounter::new(Arc::clone(&stats))),
                Arc::new(ScopedLogger),
            ],
            capture(Arc::clone(&seen)),
        );

        let mut request = Inbound::new(Method::POST, "/v1/books");
        request
            .headers
            .insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        request.remote = Some("127.0.0.1:4000".parse().unwrap());
        let ex = Exchange::new(
            RequestContext::new(logger.clone(), CancelSignal::new()),
            request,
            ResponseSink::new(BufferedResponse::new()),
        );
        chain.call(ex).await;

        let ex = seen.lock().unwrap().take().unwrap();
        assert!(UuidGenerator.is_valid(&ex.ctx.request_id, REQUEST_ID_PREFIX));
        assert_eq!(ex.ctx.request_number, 2);

        let line: serde_json::Value = serde_json::from_str(&logger.lines()[0]).unwrap();
        assert_eq!(line["request.id"], ex.ctx.request_id.as_str());
        assert_eq!(line["request.number"], "2");
        assert_eq!(line["request.method"], "POST");
        assert_eq!(line["request.path"], "/v1/books");
        assert_eq!(line["request.ip"], "127.0.0.1");
        assert_eq!(line["request.agent"], "curl/8.0");
        assert_eq!(line["request.referer"], "");
    }
}
