//! CORS headers

use axum::http::header::{self, HeaderValue};

use crate::core::pipeline::{Exchange, HandlerFuture, Next};

use super::Middleware;

const ALLOW_METHODS: &str = "POST, GET, OPTIONS, PUT, DELETE, UPDATE, PATCH, HEAD";

const ALLOW_HEADERS: &str = "Origin, Access-Control-Request-Method, Access-Control-Request-Headers, \
Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization, User-Agent, \
Accept-Language, Referer, DNT, Connection, Pragma, Cache-Control, TE";

/// Permissive CORS headers on every response
pub struct Cors;

impl Middleware for Cors {
    fn process<'a>(&'a self, ex: Exchange, next: Next) -> HandlerFuture<'a> {
        ex.sink
            .set_header(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        ex.sink.set_header(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        ex.sink.set_header(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        next.run(ex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::{Method, StatusCode};

    use crate::core::cancel::CancelSignal;
    use crate::core::context::{Inbound, RequestContext};
    use crate::core::pipeline::compose;
    use crate::core::sink::{BufferedResponse, ResponseSink};
    use crate::observability::Logger;

    #[tokio::test]
    async fn test_headers_set_before_handler() {
        let buffer = BufferedResponse::new();
        let chain = compose(
            vec![Arc::new(Cors)],
            Arc::new(|ex: Exchange| async move { ex.sink.set_status(StatusCode::NO_CONTENT) }),
        );
        chain
            .call(Exchange::new(
                RequestContext::new(Logger::discard(), CancelSignal::new()),
                Inbound::new(Method::OPTIONS, "/v1/books"),
                ResponseSink::new(buffer.clone()),
            ))
            .await;

        assert_eq!(buffer.header("access-control-allow-origin").as_deref(), Some("*"));
        assert_eq!(
            buffer.header("access-control-allow-methods").as_deref(),
            Some(ALLOW_METHODS)
        );
        assert!(buffer
            .header("access-control-allow-headers")
            .unwrap()
            .starts_with("Origin, "));
    }
}
