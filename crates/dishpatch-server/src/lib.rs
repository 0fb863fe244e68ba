//! # dishpatch-server
//!
//! Axum HTTP + `WebSocket` server for real-time order-status fan-out.
//!
//! - `WebSocket` gateway: connection registry, control messages, heartbeat
//! - Fan-out: [`notifier::OrderNotifier::notify`] resolves recipients and
//!   dispatches `order_update` events best-effort
//! - HTTP endpoints: health, Prometheus metrics, order fetch and status update
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod notifier;
pub mod orders;
pub mod realtime;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError};
pub use notifier::OrderNotifier;
pub use orders::{InMemoryOrderStore, OrderStore, StoreError};
pub use server::DishpatchServer;
