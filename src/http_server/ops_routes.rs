//! # Ops Routes
//!
//! Status, statistics, configuration, maintenance control and cache
//! clearing. Served through the ops pipeline, which skips the maintenance
//! gate, except the status and index routes which are public.

use std::sync::Arc;

use axum::http::{header, HeaderValue, StatusCode};
use serde_json::json;

use crate::clock::rfc1123;
use crate::core::Exchange;

use super::errors::HttpError;
use super::response::{reply, reply_error, send};
use super::server::AppState;

/// `GET /`: redirect to the status page
pub async fn index(_state: Arc<AppState>, ex: Exchange) {
    ex.sink
        .set_header(header::LOCATION, HeaderValue::from_static("/status"));
    ex.sink.set_status(StatusCode::SEE_OTHER);
}

/// `GET /status`
pub async fn status(state: Arc<AppState>, ex: Exchange) {
    let uptime = state.stats.uptime_minutes(state.clock.now());
    let body = json!({
        "requestid": ex.ctx.request_id,
        "status": format!("up & running since {} mins", uptime),
        "message": "Hello. Books store api is available. Enjoy :)",
    });
    send(&ex, StatusCode::OK, &body);
}

/// Fallback for unknown routes
pub async fn not_found(_state: Arc<AppState>, ex: Exchange) {
    let body = json!({
        "requestid": ex.ctx.request_id,
        "message": "route does not exist",
        "path": format!("{} {}", ex.request.method, ex.request.path),
    });
    send(&ex, StatusCode::NOT_FOUND, &body);
}

/// `GET /ops/configs`
pub async fn configs(state: Arc<AppState>, ex: Exchange) {
    send(&ex, StatusCode::OK, &json!({ "configs": state.config }));
}

/// `GET /ops/stats`
///
/// `called` leaves out the stats request itself so it matches the
/// histogram, which only sees finished requests.
pub async fn statistics(state: Arc<AppState>, ex: Exchange) {
    let stats = &state.stats;
    let (reason, since) = state.maintenance.show();
    let body = json!({
        "requestid": ex.ctx.request_id,
        "app.version": stats.version(),
        "app.container": stats.container(),
        "app.platform": stats.platform(),
        "called": stats.calls().saturating_sub(1),
        "started": rfc1123(stats.started()),
        "uptime": format!("{} mins", stats.uptime_minutes(state.clock.now())),
        "maintenance": {
            "enabled": state.maintenance.is_enabled(),
            "started": since.map(rfc1123).unwrap_or_default(),
            "reason": reason,
        },
        "status": stats.snapshot(),
    });
    send(&ex, StatusCode::OK, &body);
}

/// `GET /ops/maintenance?status=enable&msg=..|disable|show`
pub async fn maintenance(state: Arc<AppState>, ex: Exchange) {
    let mode = ex.request.query_value("status").unwrap_or("show");
    match mode {
        "enable" => {
            let reason = ex.request.query_value("msg").unwrap_or_default().to_string();
            let now = state.clock.now();
            state.maintenance.enable(reason.clone(), now);
            ex.ctx.logger.warn(
                "maintenance mode enabled",
                &[("maintenance.reason", &reason)],
            );
            let body = json!({
                "requestid": ex.ctx.request_id,
                "maintenance.started": rfc1123(now),
                "maintenance.reason": reason,
                "message": "Maintenance mode enabled successfully.",
            });
            send(&ex, StatusCode::OK, &body);
        }
        "disable" => {
            state.maintenance.disable();
            ex.ctx.logger.warn("maintenance mode disabled", &[]);
            let body = json!({
                "requestid": ex.ctx.request_id,
                "message": "Maintenance mode disabled successfully.",
            });
            send(&ex, StatusCode::OK, &body);
        }
        "show" => send(
            &ex,
            StatusCode::SERVICE_UNAVAILABLE,
            &state.maintenance.notice(),
        ),
        other => reply_error(
            &ex,
            "failed to change maintenance mode",
            &HttpError::UnknownMaintenanceStatus(other.to_string()),
            json!({}),
        ),
    }
}

/// `DELETE /ops/cache`: start clearing the primary tier and return at once
pub async fn clear_cache(state: Arc<AppState>, ex: Exchange) {
    let service = Arc::clone(&state.service);
    let request_id = ex.ctx.request_id.clone();
    tokio::spawn(async move {
        // outcome is logged by the service
        let _ = service.clear_cache(&request_id).await;
    });
    reply(
        &ex,
        StatusCode::ACCEPTED,
        "Books cache clearing started.",
        None,
        json!({}),
    );
}
