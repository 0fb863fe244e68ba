//! Wire envelopes exchanged over the `/ws` socket.
//!
//! Both directions are JSON objects discriminated by a `type` field.
//!
//! Inbound (client → server):
//!
//! ```json
//! {"type": "auth", "userId": 5}
//! {"type": "subscribe", "orderId": 100}
//! {"type": "delivery_message", "orderId": 100, "message": "at the gate"}
//! ```
//!
//! Outbound (server → client):
//!
//! ```json
//! {"type": "order_update", "data": {"id": 100, "user_id": 5, "status": "preparing"}}
//! {"type": "delivery_message", "data": {"orderId": 100, "message": "...", "timestamp": "..."}}
//! ```

use chrono::{DateTime, Utc};
use dishpatch_core::{OrderId, OrderRecord, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inbound control message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind a user identity to the connection.
    Auth {
        /// User the client claims to be.
        #[serde(rename = "userId")]
        user_id: UserId,
    },
    /// Follow a single order.
    Subscribe {
        /// Order to follow.
        #[serde(rename = "orderId")]
        order_id: OrderId,
    },
    /// Chat line for the other parties following an order.
    DeliveryMessage {
        /// Order the conversation belongs to.
        #[serde(rename = "orderId")]
        order_id: OrderId,
        /// Message text.
        message: String,
    },
}

impl ClientMessage {
    /// Tag value, for logs and metric labels.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Subscribe { .. } => "subscribe",
            Self::DeliveryMessage { .. } => "delivery_message",
        }
    }
}

const KNOWN_TYPES: [&str; 3] = ["auth", "subscribe", "delivery_message"];

/// Why an inbound frame was rejected.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Not JSON, or a field has the wrong shape.
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),
    /// No string `type` field on a JSON object.
    #[error("missing message type")]
    MissingType,
    /// `type` names no known message.
    #[error("unknown message type: {0}")]
    UnknownType(String),
    /// Field parsed but its value is unusable.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        /// Wire name of the field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Parse and validate one inbound text frame.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;
    if !KNOWN_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_owned()));
    }

    let message: ClientMessage = serde_json::from_value(value)?;
    validate(&message)?;
    Ok(message)
}

fn validate(message: &ClientMessage) -> Result<(), ProtocolError> {
    match message {
        ClientMessage::Auth { user_id } if !user_id.is_valid() => Err(ProtocolError::InvalidField {
            field: "userId",
            reason: "must be a positive integer",
        }),
        ClientMessage::Subscribe { order_id } | ClientMessage::DeliveryMessage { order_id, .. }
            if !order_id.is_valid() =>
        {
            Err(ProtocolError::InvalidField {
                field: "orderId",
                reason: "must be a positive integer",
            })
        }
        ClientMessage::DeliveryMessage { message, .. } if message.trim().is_empty() => {
            Err(ProtocolError::InvalidField {
                field: "message",
                reason: "must not be empty",
            })
        }
        _ => Ok(()),
    }
}

/// Chat line as relayed to other subscribers of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryMessage {
    /// Order the conversation belongs to.
    pub order_id: OrderId,
    /// Message text.
    pub message: String,
    /// Sender's user, if the sending connection authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_user_id: Option<UserId>,
    /// When the server accepted the message.
    pub timestamp: DateTime<Utc>,
}

/// Outbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// An order changed status and/or driver location.
    OrderUpdate(OrderRecord),
    /// Delivery chat relay.
    DeliveryMessage(DeliveryMessage),
}

impl ServerEvent {
    /// Tag value, for logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OrderUpdate(_) => "order_update",
            Self::DeliveryMessage(_) => "delivery_message",
        }
    }

    /// Serialize to the text frame sent to clients.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
