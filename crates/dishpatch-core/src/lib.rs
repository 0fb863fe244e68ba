//! # dishpatch-core
//!
//! Shared vocabulary for the dishpatch crates:
//!
//! - **Branded IDs**: `ConnectionId` (UUID v7), `UserId` and `OrderId` (database serials)
//! - **Orders**: `OrderRecord`, `OrderStatus`, `DriverLocation` as carried on the wire
//! - **Logging**: `tracing` subscriber bootstrap

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod orders;

pub use ids::{ConnectionId, OrderId, UserId};
pub use orders::{DriverLocation, OrderRecord, OrderStatus};
