//! Request Context
//!
//! Context carried through the middleware chain by value. Each stage
//! fills in what it owns (request id, sequence number, scoped logger,
//! deadline) before handing it to the next stage.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method};

use crate::observability::Logger;

use super::cancel::CancelSignal;

/// Context carried through the pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request id (`r:<uuid>`), empty until tagged
    pub request_id: String,

    /// Per-process request sequence number, 0 until counted
    pub request_number: u64,

    /// Request-scoped logger
    pub logger: Logger,

    /// Processing deadline negotiated by the cancellation guard
    pub deadline: Option<tokio::time::Instant>,

    /// Fired when the client goes away
    pub client_gone: CancelSignal,
}

impl RequestContext {
    /// Create a fresh context with the process logger
    pub fn new(logger: Logger, client_gone: CancelSignal) -> Self {
        Self {
            request_id: String::new(),
            request_number: 0,
            logger,
            deadline: None,
            client_gone,
        }
    }
}

/// Framework-neutral view of an inbound call
#[derive(Debug, Clone, Default)]
pub struct Inbound {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub params: HashMap<String, String>,
    pub body: Bytes,
    pub remote: Option<SocketAddr>,
}

impl Inbound {
    /// Minimal request, mostly for tests
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Path parameter by name
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Query parameter by name
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    fn header_str(&self, name: impl header::AsHeaderName) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    /// `User-Agent` header, empty when absent
    pub fn user_agent(&self) -> &str {
        self.header_str(header::USER_AGENT)
    }

    /// `Referer` header, empty when absent
    pub fn referer(&self) -> &str {
        self.header_str(header::REFERER)
    }

    /// Caller address: `X-Real-IP`, then the first parseable `X-Forwarded-For`
    /// entry, then the peer address
    pub fn source_ip(&self) -> String {
        let real_ip = self.header_str("x-real-ip").trim();
        if real_ip.parse::<IpAddr>().is_ok() {
            return real_ip.to_string();
        }

        if let Some(ip) = self
            .header_str("x-forwarded-for")
            .split(',')
            .map(str::trim)
            .find(|ip| ip.parse::<IpAddr>().is_ok())
        {
            return ip.to_string();
        }

        self.remote.map(|addr| addr.ip().to_string()).unwrap_or_default()
    }
}
