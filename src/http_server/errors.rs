//! # HTTP Errors
//!
//! Error types for the book and ops routes, and the error envelope they
//! are rendered into.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::storage::StorageError;

/// Result type for route handlers
pub type HttpResult<T> = Result<T, HttpError>;

/// Route handler errors
#[derive(Debug, Error)]
pub enum HttpError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Body is not a valid book document
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Required book field left empty
    #[error("{0} is required")]
    MissingField(&'static str),

    /// Path id is not a well-formed book id
    #[error("book id provided is not valid")]
    InvalidBookId,

    /// Path id and body id disagree
    #[error("book id in path does not match the body id")]
    IdMismatch,

    /// Unknown `status` for the maintenance endpoint
    #[error("unknown maintenance status: {0:?}")]
    UnknownMaintenanceStatus(String),

    /// Body exceeded the configured limit
    #[error("request body too large")]
    PayloadTooLarge,

    /// Book does not exist in either tier
    #[error("book does not exist")]
    BookNotFound,

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Storage failure other than a missing book
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for HttpError {
    fn from(err: StorageError) -> Self {
        if err.is_not_found() {
            HttpError::BookNotFound
        } else {
            HttpError::Storage(err)
        }
    }
}

impl HttpError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::InvalidBody(_)
            | HttpError::MissingField(_)
            | HttpError::InvalidBookId
            | HttpError::IdMismatch
            | HttpError::UnknownMaintenanceStatus(_) => StatusCode::BAD_REQUEST,
            HttpError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            HttpError::BookNotFound => StatusCode::NOT_FOUND,
            HttpError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope message: the error itself for id and lookup failures,
    /// the route's `context` otherwise
    pub fn public_message(&self, context: &str) -> String {
        match self {
            HttpError::InvalidBookId | HttpError::BookNotFound => self.to_string(),
            _ => context.to_string(),
        }
    }

    /// Envelope data: the error text for client mistakes, `fallback` otherwise
    pub fn public_data(&self, fallback: Value) -> Value {
        match self {
            HttpError::InvalidBody(_)
            | HttpError::MissingField(_)
            | HttpError::IdMismatch
            | HttpError::UnknownMaintenanceStatus(_) => Value::String(self.to_string()),
            _ => fallback,
        }
    }

    /// Render into the error envelope for request `request_id`
    pub fn to_envelope(&self, request_id: &str, context: &str, fallback: Value) -> ErrorEnvelope {
        ErrorEnvelope {
            requestid: request_id.to_string(),
            status: self.status_code().as_u16(),
            message: self.public_message(context),
            data: self.public_data(fallback),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub requestid: String,
    pub status: u16,
    pub message: String,
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_codes() {
        assert_eq!(HttpError::MissingField("title").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::InvalidBookId.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(HttpError::BookNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            HttpError::Storage(StorageError::Internal("x".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_storage_error_maps_to_404() {
        let err: HttpError = StorageError::NotFound("b:1".into()).into();
        assert!(matches!(err, HttpError::BookNotFound));
    }

    #[test]
    fn test_validation_envelope_carries_field_message() {
        let envelope =
            HttpError::MissingField("price").to_envelope("r:1", "failed to create the book", json!({}));
        assert_eq!(envelope.status, 400);
        assert_eq!(envelope.message, "failed to create the book");
        assert_eq!(envelope.data, json!("price is required"));
    }

    #[test]
    fn test_lookup_envelope_uses_own_message() {
        let envelope = HttpError::BookNotFound.to_envelope("r:1", "ignored", json!({"id": "b:1"}));
        assert_eq!(envelope.message, "book does not exist");
        assert_eq!(envelope.data, json!({"id": "b:1"}));
    }
}
