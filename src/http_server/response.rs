//! Response envelopes written to the pipeline sink

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::core::{Exchange, SinkError};

use super::errors::HttpError;

/// Success response body
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub requestid: String,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    pub data: T,
}

/// Send a success envelope
pub fn reply<T: Serialize>(
    ex: &Exchange,
    status: StatusCode,
    message: &str,
    total: Option<usize>,
    data: T,
) {
    let body = Envelope {
        requestid: ex.ctx.request_id.clone(),
        status: status.as_u16(),
        message: message.to_string(),
        total,
        data,
    };
    send(ex, status, &body);
}

/// Log `err` and send its error envelope
pub fn reply_error(ex: &Exchange, context: &str, err: &HttpError, fallback: Value) {
    ex.ctx.logger.error(context, &[("error", &err.to_string())]);
    let body = err.to_envelope(&ex.ctx.request_id, context, fallback);
    send(ex, err.status_code(), &body);
}

/// Serialize `body` onto the sink
///
/// A rejected write after the guard finalized the request is expected and
/// only logged at debug level.
pub fn send<T: Serialize>(ex: &Exchange, status: StatusCode, body: &T) {
    match ex.sink.write_json(status, body) {
        Ok(_) => {}
        Err(SinkError::AlreadyFinalized(reason)) => ex.ctx.logger.debug(
            "response dropped, request already finalized",
            &[("reason", reason.marker())],
        ),
        Err(err) => ex
            .ctx
            .logger
            .error("failed to send response", &[("error", &err.to_string())]),
    }
}
