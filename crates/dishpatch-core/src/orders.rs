//! Order records as they travel through the fan-out path.
//!
//! The relational store owns orders; this crate only describes the shape the
//! store hands to `notify` and the shape pushed to clients inside
//! `order_update` events. Columns this crate does not model are carried
//! through untouched in [`OrderRecord::extra`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{OrderId, UserId};

/// Lifecycle status of an order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Placed, not yet accepted by the restaurant.
    #[default]
    Pending,
    /// Accepted by the restaurant.
    Confirmed,
    /// Being cooked.
    Preparing,
    /// Ready for pickup by the driver.
    Ready,
    /// On the way.
    OutForDelivery,
    /// Handed to the customer.
    Delivered,
    /// Cancelled by either side.
    Cancelled,
}

impl OrderStatus {
    /// Wire representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last reported driver position.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriverLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// An order row as persisted by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Order ID.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Current status.
    #[serde(default)]
    pub status: OrderStatus,
    /// Driver position, once a driver is assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_location: Option<DriverLocation>,
    /// Last modification time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Remaining columns (restaurant, totals, address, ...), passed through as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OrderRecord {
    /// Minimal record with no extra columns.
    pub fn new(id: OrderId, user_id: UserId, status: OrderStatus) -> Self {
        Self {
            id,
            user_id,
            status,
            driver_location: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Apply a status transition (and optional driver position), stamping `updated_at`.
    pub fn apply_status(&mut self, status: OrderStatus, driver_location: Option<DriverLocation>) {
        self.status = status;
        if driver_location.is_some() {
            self.driver_location = driver_location;
        }
        self.updated_at = Some(Utc::now());
    }
}
