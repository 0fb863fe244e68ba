//! Order HTTP endpoints.
//!
//! - `GET /api/orders/{id}`: current record (the refetch path after reconnect)
//! - `PUT /api/orders/{id}/status`: admin status change, then fan-out

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::routing::{get, put};
use dishpatch_core::{DriverLocation, OrderId, OrderRecord, OrderStatus};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::error::ApiError;
use crate::server::AppState;

/// Body of `PUT /api/orders/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    /// New status.
    pub status: OrderStatus,
    /// Latest driver position, if any.
    #[serde(default)]
    pub driver_location: Option<DriverLocation>,
}

/// Order routes, merged into the main router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/orders/{id}", get(get_order))
        .route("/api/orders/{id}/status", put(update_order_status))
}

/// GET /api/orders/{id}
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<OrderRecord>, ApiError> {
    let id = OrderId::new(id);
    if !id.is_valid() {
        return Err(ApiError::OrderNotFound(id));
    }
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or(ApiError::OrderNotFound(id))
}

/// PUT /api/orders/{id}/status
#[instrument(skip_all, fields(order_id = id))]
async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<OrderRecord>, ApiError> {
    require_admin(&headers, state.config.admin_token.as_deref())?;
    let Json(update) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let id = OrderId::new(id);
    if !id.is_valid() {
        return Err(ApiError::OrderNotFound(id));
    }
    let order = state
        .store
        .update_status(id, update.status, update.driver_location)
        .await?
        .ok_or(ApiError::OrderNotFound(id))?;

    info!(status = %order.status, "order status updated");
    let _ = state.notifier.notify(&order);
    Ok(Json(order))
}

/// Accept only `Authorization: Bearer <expected>`. No configured token means
/// nobody is an admin.
fn require_admin(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ApiError> {
    let Some(expected) = expected else {
        return Err(ApiError::Forbidden);
    };
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if presented == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}
