//! Real-time order-status fan-out over WebSocket.
//!
//! - [`registry`]: live connections and their user/order bindings
//! - [`protocol`]: inbound control and outbound event envelopes
//! - [`resolver`]: which connections an event is for
//! - [`dispatcher`]: best-effort send to those connections
//! - [`session`]: per-socket loop wiring transport events to the registry

pub mod chat;
pub mod connection;
pub mod dispatcher;
pub mod heartbeat;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod session;
