//! # Book Routes
//!
//! CRUD handlers for `/v1/books`. Each handler runs at the end of the
//! public pipeline and answers with the success or error envelope.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

use crate::clock::rfc3339;
use crate::core::Exchange;
use crate::ids::BOOK_ID_PREFIX;
use crate::storage::{Book, BookService, StorageError, StorageResult};

use super::errors::{HttpError, HttpResult};
use super::response::{reply, reply_error};
use super::server::AppState;

/// Run a service call on the blocking pool; the backup tier hits the disk
async fn with_service<T, F>(state: &AppState, call: F) -> HttpResult<T>
where
    F: FnOnce(&BookService) -> StorageResult<T> + Send + 'static,
    T: Send + 'static,
{
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| HttpError::Storage(StorageError::Internal(e.to_string())))?
        .map_err(HttpError::from)
}

fn decode_book(ex: &Exchange) -> HttpResult<Book> {
    serde_json::from_slice(&ex.request.body).map_err(|e| HttpError::InvalidBody(e.to_string()))
}

/// Path id, checked against the book id format
fn path_id(state: &AppState, ex: &Exchange) -> HttpResult<String> {
    let id = ex.request.param("id").unwrap_or_default();
    if state.ids.is_valid(id, BOOK_ID_PREFIX) {
        Ok(id.to_string())
    } else {
        Err(HttpError::InvalidBookId)
    }
}

/// `POST /v1/books`
pub async fn create_book(state: Arc<AppState>, ex: Exchange) {
    const CONTEXT: &str = "failed to create the book";

    let mut book = match decode_book(&ex) {
        Ok(book) => book,
        Err(err) => return reply_error(&ex, CONTEXT, &err, json!(Book::default())),
    };
    if let Some(field) = book.missing_for_create() {
        return reply_error(&ex, CONTEXT, &HttpError::MissingField(field), json!(book));
    }

    let now = rfc3339(state.clock.now());
    book.id = state.ids.generate(BOOK_ID_PREFIX);
    book.created_at = now.clone();
    book.updated_at = now;

    let stored = book.clone();
    match with_service(&state, move |service| service.add(&stored.id, &stored)).await {
        Ok(()) => {
            ex.ctx.logger.info("success to create book", &[("book.id", &book.id)]);
            reply(&ex, StatusCode::CREATED, "Book created successfully.", None, book);
        }
        Err(err) => reply_error(&ex, CONTEXT, &err, json!(book)),
    }
}

/// `GET /v1/books`
pub async fn get_all_books(state: Arc<AppState>, ex: Exchange) {
    match with_service(&state, |service| service.get_all()).await {
        Ok(books) => {
            ex.ctx.logger.info("success to get all books", &[]);
            let total = books.len();
            reply(&ex, StatusCode::OK, "All books fetched successfully.", Some(total), books);
        }
        Err(err) => reply_error(&ex, "failed to get all books", &err, json!([])),
    }
}

/// `GET /v1/books/:id`
pub async fn get_one_book(state: Arc<AppState>, ex: Exchange) {
    const CONTEXT: &str = "failed to get the book";

    let id = match path_id(&state, &ex) {
        Ok(id) => id,
        Err(err) => return reply_error(&ex, CONTEXT, &err, json!(Book::default())),
    };

    let lookup = id.clone();
    match with_service(&state, move |service| service.get_one(&lookup)).await {
        Ok(book) => {
            ex.ctx.logger.info("success to get book", &[("book.id", &id)]);
            reply(&ex, StatusCode::OK, "Book fetched successfully.", None, book);
        }
        Err(err) => reply_error(&ex, CONTEXT, &err, json!(Book::with_id(id))),
    }
}

/// `DELETE /v1/books/:id`
///
/// Looks the book up first so a missing book answers 404.
pub async fn delete_book(state: Arc<AppState>, ex: Exchange) {
    let id = match path_id(&state, &ex) {
        Ok(id) => id,
        Err(err) => {
            return reply_error(&ex, "failed to delete the book", &err, json!(Book::default()))
        }
    };

    let lookup = id.clone();
    let book = match with_service(&state, move |service| service.get_one(&lookup)).await {
        Ok(book) => book,
        Err(err) => {
            return reply_error(
                &ex,
                "failed to check if the book exist",
                &err,
                json!(Book::with_id(id)),
            )
        }
    };

    let target = id.clone();
    match with_service(&state, move |service| service.delete(&target)).await {
        Ok(()) => {
            ex.ctx.logger.info("success to delete book", &[("book.id", &id)]);
            reply(&ex, StatusCode::OK, "Book deleted successfully.", None, book);
        }
        Err(err) => reply_error(&ex, "failed to delete the book", &err, json!(book)),
    }
}

/// `PUT /v1/books/:id`
pub async fn update_book(state: Arc<AppState>, ex: Exchange) {
    const CONTEXT: &str = "failed to update the book";

    let id = match path_id(&state, &ex) {
        Ok(id) => id,
        Err(err) => return reply_error(&ex, CONTEXT, &err, json!(Book::default())),
    };
    let book = match decode_book(&ex) {
        Ok(book) => book,
        Err(err) => return reply_error(&ex, CONTEXT, &err, json!(Book::with_id(id))),
    };
    if let Some(field) = book.missing_for_update() {
        return reply_error(&ex, CONTEXT, &HttpError::MissingField(field), json!(book));
    }
    if book.id != id {
        return reply_error(&ex, CONTEXT, &HttpError::IdMismatch, json!(book));
    }

    let fallback = json!(book);
    match with_service(&state, move |service| service.update(&id, book)).await {
        Ok(updated) => {
            ex.ctx
                .logger
                .info("success to update book", &[("book.id", &updated.id)]);
            reply(&ex, StatusCode::OK, "Book updated successfully.", None, updated);
        }
        Err(err) => reply_error(&ex, CONTEXT, &err, fallback),
    }
}
