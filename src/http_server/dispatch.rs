//! axum adapter for the request pipeline
//!
//! Every route is a [`Mount`]: it turns the axum request into an
//! [`Inbound`], runs the composed chain on its own task and converts the
//! buffered outcome back into an axum response. Dropping the axum future
//! (client went away) fires the request's client-cancel signal.
//!
//! A body that cannot be read within the size limit is answered by the
//! route's rejection chain, the same stack around [`payload_too_large`],
//! so the 413 is tagged, counted and recorded like any other response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, Request};
use axum::http::StatusCode;
use axum::body::Bytes;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::core::{
    BufferedResponse, CancelSignal, Exchange, Handler, Inbound, RequestContext, ResponseSink,
};
use crate::observability::Logger;

use super::errors::HttpError;
use super::response::send;

/// Handler behind every route's rejection chain
pub async fn payload_too_large(ex: Exchange) {
    let err = HttpError::PayloadTooLarge;
    let body = err.to_envelope(&ex.ctx.request_id, &err.to_string(), json!({}));
    send(&ex, err.status_code(), &body);
}

/// A composed chain bound to an axum route
#[derive(Clone)]
pub struct Mount {
    chain: Arc<dyn Handler>,
    rejection: Arc<dyn Handler>,
    logger: Logger,
    max_body_bytes: usize,
}

impl Mount {
    /// `rejection` answers requests whose body is over `max_body_bytes`
    pub fn new(
        chain: Arc<dyn Handler>,
        rejection: Arc<dyn Handler>,
        logger: Logger,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            chain,
            rejection,
            logger,
            max_body_bytes,
        }
    }

    /// Serve one axum request through the chain
    pub async fn serve(self, req: Request) -> Response {
        let (mut parts, body) = req.into_parts();

        let params = Path::<HashMap<String, String>>::from_request_parts(&mut parts, &())
            .await
            .map(|Path(params)| params)
            .unwrap_or_default();
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let remote = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (body, chain) = match to_bytes(body, self.max_body_bytes).await {
            Ok(body) => (body, Arc::clone(&self.chain)),
            Err(err) => {
                self.logger.warn(
                    "failed to read request body",
                    &[("path", parts.uri.path()), ("error", &err.to_string())],
                );
                (Bytes::new(), Arc::clone(&self.rejection))
            }
        };

        let inbound = Inbound {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers,
            params,
            body,
            remote,
        };

        let buffer = BufferedResponse::new();
        let client_gone = CancelSignal::new();
        let ctx = RequestContext::new(self.logger.clone(), client_gone.clone());
        let ex = Exchange::new(ctx, inbound, ResponseSink::new(buffer.clone()));

        let armed = client_gone.drop_guard();
        let outcome = tokio::spawn(async move { chain.call(ex).await }).await;
        armed.disarm();

        match outcome {
            Ok(()) => buffer.into_response(),
            Err(err) => {
                self.logger
                    .error("request task failed", &[("error", &err.to_string())]);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
