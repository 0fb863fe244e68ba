//! Server startup and HTTP handler errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use dishpatch_core::OrderId;
use serde_json::json;
use thiserror::Error;

use crate::orders::StoreError;

/// Errors raised while starting the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying socket error.
        source: std::io::Error,
    },
    /// Other socket error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors returned by the HTTP API, rendered as `{"message": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or wrong admin credentials, or no admin token configured.
    #[error("admin access required")]
    Forbidden,
    /// No such order.
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    /// Request body could not be used.
    #[error("{0}")]
    BadRequest(String),
    /// The order store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::OrderNotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_statuses() {
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::OrderNotFound(OrderId::new(3)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::Unavailable("down".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn response_body_carries_message_key() {
        let resp = ApiError::OrderNotFound(OrderId::new(7)).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, json!({ "message": "order 7 not found" }));
    }

    #[test]
    fn not_found_message_names_order() {
        assert_eq!(
            ApiError::OrderNotFound(OrderId::new(12)).to_string(),
            "order 12 not found"
        );
    }

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:80: denied");
    }
}
