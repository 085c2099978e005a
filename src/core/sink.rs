//! Write-once response sink
//!
//! Wraps the outbound [`ResponseWriter`]. At most one status is ever
//! committed to the writer. Once the cancellation guard has finalized the
//! response, every later status or body write from the handler is dropped.
//!
//! The sink is the single source of truth for the status recorded in the
//! statistics: it reports what went out, not what the handler intended.

use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::Body;
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use thiserror::Error;

/// Header set when the guard finalized the response (`C` or `T`)
pub const ABORTED_HEADER: &str = "x-request-aborted";

/// Non-standard "client closed request" status
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// JSON content type used by every payload
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Why the guard took over the response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Client disconnected
    Cancelled,
    /// Processing deadline exceeded
    TimedOut,
}

impl AbortReason {
    /// Marker value for [`ABORTED_HEADER`]
    pub fn marker(&self) -> &'static str {
        match self {
            AbortReason::Cancelled => "C",
            AbortReason::TimedOut => "T",
        }
    }
}

/// Sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// The guard already finalized the response
    #[error("handler: request timed out or cancelled")]
    AlreadyFinalized(AbortReason),

    /// Writing to the outbound channel failed
    #[error("response write failed: {0}")]
    Io(#[from] io::Error),

    /// Payload could not be encoded
    #[error("response encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Outbound response channel
pub trait ResponseWriter: Send {
    /// Set a header to send with the status line
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Send the status line
    fn write_status(&mut self, status: StatusCode);

    /// Send a body chunk
    fn write_body(&mut self, chunk: &[u8]) -> io::Result<usize>;
}

struct SinkState {
    writer: Box<dyn ResponseWriter>,
    status: StatusCode,
    bytes: usize,
    committed: bool,
    aborted: Option<AbortReason>,
}

/// Shared handle on the write-once sink of one request
#[derive(Clone)]
pub struct ResponseSink {
    state: Arc<Mutex<SinkState>>,
}

impl fmt::Debug for ResponseSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ResponseSink")
            .field("status", &state.status)
            .field("bytes", &state.bytes)
            .field("committed", &state.committed)
            .field("aborted", &state.aborted)
            .finish()
    }
}

impl ResponseSink {
    /// Wrap an outbound writer. The default status is 200.
    pub fn new(writer: impl ResponseWriter + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(SinkState {
                writer: Box::new(writer),
                status: StatusCode::OK,
                bytes: 0,
                committed: false,
                aborted: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set a header. Ignored once the status went out.
    pub fn set_header(&self, name: HeaderName, value: HeaderValue) {
        let mut state = self.lock();
        if !state.committed && state.aborted.is_none() {
            state.writer.set_header(name, value);
        }
    }

    /// Commit `status` unless a status already went out or the guard took over
    pub fn set_status(&self, status: StatusCode) {
        let mut state = self.lock();
        if state.aborted.is_some() || state.committed {
            return;
        }
        commit(&mut state, status);
    }

    /// Send a body chunk, committing the current status first if needed
    pub fn write(&self, chunk: &[u8]) -> Result<usize, SinkError> {
        let mut state = self.lock();
        if let Some(reason) = state.aborted {
            return Err(SinkError::AlreadyFinalized(reason));
        }
        if !state.committed {
            let status = state.status;
            commit(&mut state, status);
        }
        let n = state.writer.write_body(chunk)?;
        state.bytes += n;
        Ok(n)
    }

    /// Serialize `payload` as JSON and send it with `status`
    pub fn write_json<T: serde::Serialize>(
        &self,
        status: StatusCode,
        payload: &T,
    ) -> Result<usize, SinkError> {
        let body = serde_json::to_vec(payload)?;
        self.set_header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        self.set_status(status);
        self.write(&body)
    }

    /// Guard-side finalization
    ///
    /// Marks the sink so every later handler write is rejected, then sends
    /// `status` (and `body`, when given) if nothing was committed yet.
    /// Returns `Ok(true)` when the guard's response went out.
    pub fn finalize(
        &self,
        reason: AbortReason,
        status: StatusCode,
        body: Option<&[u8]>,
    ) -> Result<bool, SinkError> {
        let mut state = self.lock();
        if state.aborted.is_some() {
            return Ok(false);
        }
        state.aborted = Some(reason);
        if state.committed {
            return Ok(false);
        }

        state.writer.set_header(
            HeaderName::from_static(ABORTED_HEADER),
            HeaderValue::from_static(reason.marker()),
        );
        if body.is_some() {
            state
                .writer
                .set_header(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        commit(&mut state, status);

        if let Some(body) = body {
            let n = state.writer.write_body(body)?;
            state.bytes += n;
        }
        Ok(true)
    }

    /// Status that went out, or the pending default
    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    /// Body bytes sent
    pub fn bytes(&self) -> usize {
        self.lock().bytes
    }

    /// Whether a status went out
    pub fn is_committed(&self) -> bool {
        self.lock().committed
    }

    /// Guard's finalization reason, if any
    pub fn aborted(&self) -> Option<AbortReason> {
        self.lock().aborted
    }
}

fn commit(state: &mut SinkState, status: StatusCode) {
    state.status = status;
    state.committed = true;
    state.writer.write_status(status);
}

#[derive(Debug)]
struct Buffered {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: Vec<u8>,
}

/// In-memory [`ResponseWriter`] turned into an axum [`Response`] at the end
///
/// Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct BufferedResponse {
    inner: Arc<Mutex<Buffered>>,
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedResponse {
    /// Empty buffer
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Buffered {
                status: None,
                headers: HeaderMap::new(),
                body: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Buffered> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Status received so far
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status
    }

    /// Body received so far
    pub fn body(&self) -> Vec<u8> {
        self.lock().body.clone()
    }

    /// Header value received so far
    pub fn header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Build the final response; an uncommitted buffer answers 200
    pub fn into_response(self) -> Response {
        let mut buffered = self.lock();
        let status = buffered.status.unwrap_or(StatusCode::OK);
        let headers = std::mem::take(&mut buffered.headers);
        let body = std::mem::take(&mut buffered.body);
        drop(buffered);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

impl ResponseWriter for BufferedResponse {
    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        self.lock().status = Some(status);
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<usize> {
        self.lock().body.extend_from_slice(chunk);
        Ok(chunk.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Writer that counts status lines
    #[derive(Clone, Default)]
    struct CountingWriter {
        statuses: Arc<Mutex<Vec<StatusCode>>>,
    }

    impl ResponseWriter for CountingWriter {
        fn set_header(&mut self, _name: HeaderName, _value: HeaderValue) {}

        fn write_status(&mut self, status: StatusCode) {
            self.statuses.lock().unwrap().push(status);
        }

        fn write_body(&mut self, chunk: &[u8]) -> io::Result<usize> {
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_single_commit() {
        let writer = CountingWriter::default();
        let sink = ResponseSink::new(writer.clone());

        sink.set_status(StatusCode::CREATED);
        sink.set_status(StatusCode::BAD_REQUEST);
        sink.write(b"one").unwrap();
        sink.write(b"two").unwrap();
        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(*writer.statuses.lock().unwrap(), vec![StatusCode::CREATED]);
        assert_eq!(sink.status(), StatusCode::CREATED);
        assert_eq!(sink.bytes(), 6);
    }

    #[test]
    fn test_first_write_commits_default_status() {
        let writer = CountingWriter::default();
        let sink = ResponseSink::new(writer.clone());

        sink.write(b"{}").unwrap();
        assert!(sink.is_committed());
        assert_eq!(*writer.statuses.lock().unwrap(), vec![StatusCode::OK]);
    }

    #[test]
    fn test_writes_after_finalize_are_rejected() {
        let buffer = BufferedResponse::new();
        let sink = ResponseSink::new(buffer.clone());

        let sent = sink
            .finalize(AbortReason::TimedOut, StatusCode::GATEWAY_TIMEOUT, Some(b"{\"x\":1}"))
            .unwrap();
        assert!(sent);

        sink.set_status(StatusCode::OK);
        let err = sink.write(b"late").unwrap_err();
        assert!(matches!(err, SinkError::AlreadyFinalized(AbortReason::TimedOut)));

        assert_eq!(buffer.status(), Some(StatusCode::GATEWAY_TIMEOUT));
        assert_eq!(buffer.body(), b"{\"x\":1}".to_vec());
        assert_eq!(buffer.header(ABORTED_HEADER).as_deref(), Some("T"));
        assert_eq!(buffer.header("content-type").as_deref(), Some(JSON_CONTENT_TYPE));
        assert_eq!(sink.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_cancel_finalize_sends_no_body() {
        let buffer = BufferedResponse::new();
        let sink = ResponseSink::new(buffer.clone());
        let status = StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap();

        assert!(sink.finalize(AbortReason::Cancelled, status, None).unwrap());
        assert_eq!(buffer.status(), Some(status));
        assert!(buffer.body().is_empty());
        assert_eq!(buffer.header(ABORTED_HEADER).as_deref(), Some("C"));
        assert_eq!(buffer.header("content-type"), None);
    }

    #[test]
    fn test_finalize_after_commit_keeps_handler_status() {
        let buffer = BufferedResponse::new();
        let sink = ResponseSink::new(buffer.clone());

        sink.write_json(StatusCode::CREATED, &serde_json::json!({"ok": true}))
            .unwrap();
        let sent = sink
            .finalize(AbortReason::TimedOut, StatusCode::GATEWAY_TIMEOUT, Some(b"{}"))
            .unwrap();

        assert!(!sent);
        assert_eq!(sink.status(), StatusCode::CREATED);
        assert_eq!(buffer.status(), Some(StatusCode::CREATED));
        assert_eq!(sink.aborted(), Some(AbortReason::TimedOut));
    }

    #[test]
    fn test_second_finalize_is_noop() {
        let sink = ResponseSink::new(BufferedResponse::new());
        assert!(sink.finalize(AbortReason::Cancelled, StatusCode::GATEWAY_TIMEOUT, None).unwrap());
        assert!(!sink.finalize(AbortReason::TimedOut, StatusCode::OK, None).unwrap());
        assert_eq!(sink.aborted(), Some(AbortReason::Cancelled));
    }

    #[test]
    fn test_buffer_into_response() {
        let buffer = BufferedResponse::new();
        let sink = ResponseSink::new(buffer.clone());
        sink.write_json(StatusCode::NOT_FOUND, &serde_json::json!({"a": 1}))
            .unwrap();

        let response = buffer.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
    }
}
