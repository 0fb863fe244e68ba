//! `DishpatchServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::{WS_CONNECTIONS_REJECTED_TOTAL, render};
use crate::notifier::OrderNotifier;
use crate::orders::{self, OrderStore};
use crate::realtime::registry::ConnectionRegistry;
use crate::realtime::session::run_ws_session;
use crate::shutdown::ShutdownCoordinator;

/// Transport ceiling for one WebSocket message. Payloads between
/// `max_message_size` and this are discarded by the session; beyond it the
/// transport fails and the socket closes.
const TRANSPORT_MESSAGE_LIMIT: usize = 16 * 1024 * 1024;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Order update fan-out.
    pub notifier: OrderNotifier,
    /// Order persistence.
    pub store: Arc<dyn OrderStore>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The main dishpatch server.
pub struct DishpatchServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    notifier: OrderNotifier,
    store: Arc<dyn OrderStore>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl DishpatchServer {
    /// Create a new server.
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn OrderStore>,
        metrics: PrometheusHandle,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            config: Arc::new(config),
            notifier: OrderNotifier::new(registry.clone()),
            registry,
            store,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            config: self.config.clone(),
            registry: self.registry.clone(),
            notifier: self.notifier.clone(),
            store: self.store.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .merge(orders::routes::router())
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind and serve in the background until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.shutdown.token();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = result {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(%local_addr, "dishpatch server listening");
        Ok((local_addr, handle))
    }

    /// Get the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Get the order notifier.
    pub fn notifier(&self) -> &OrderNotifier {
        &self.notifier
    }

    /// Get the order store.
    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(state.start_time, state.registry.stats()))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    render(&state.metrics)
}

/// GET /ws: upgrade and hand the socket to a session.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return unavailable("server shutting down");
    }
    let connections = state.registry.len();
    if connections >= state.config.max_connections {
        counter!(WS_CONNECTIONS_REJECTED_TOTAL).increment(1);
        warn!(
            connections,
            max = state.config.max_connections,
            "connection limit reached, rejecting upgrade"
        );
        return unavailable("connection limit reached");
    }

    let registry = state.registry.clone();
    let session = state.config.session();
    let close = state.shutdown.session_token();
    let limit = TRANSPORT_MESSAGE_LIMIT.max(state.config.max_message_size);
    ws.max_message_size(limit)
        .on_upgrade(move |socket| run_ws_session(socket, registry, session, close))
        .into_response()
}

fn unavailable(reason: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "message": reason })),
    )
        .into_response()
}
