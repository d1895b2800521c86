use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event.
///
/// Consumers deduplicate at-least-once deliveries by this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channels that downstream consumers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "order.created")]
    OrderCreated,
    #[serde(rename = "order.cancelled")]
    OrderCancelled,
    #[serde(rename = "order.status.changed")]
    OrderStatusChanged,
    #[serde(rename = "payment.success")]
    PaymentSuccess,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    /// Dead-letter channel for stock that could not be returned.
    #[serde(rename = "order.stock.compensation.failed")]
    StockCompensationFailed,
}

impl Topic {
    /// Returns the topic name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderCreated => "order.created",
            Topic::OrderCancelled => "order.cancelled",
            Topic::OrderStatusChanged => "order.status.changed",
            Topic::PaymentSuccess => "payment.success",
            Topic::PaymentFailed => "payment.failed",
            Topic::StockCompensationFailed => "order.stock.compensation.failed",
        }
    }

    /// Returns the `event_type` stamped on events sent to this topic.
    pub fn event_type(&self) -> &'static str {
        match self {
            Topic::StockCompensationFailed => "stock.compensation.failed",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An event published to other services.
///
/// `key` carries the business number (order number or payment number) and is
/// the unit of ordering on the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    pub event_id: EventId,
    pub topic: Topic,
    pub event_type: String,
    pub key: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl IntegrationEvent {
    /// Builds an event for `topic` from a serializable payload.
    pub fn new<T: Serialize>(
        topic: Topic,
        key: impl Into<String>,
        data: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            event_id: EventId::new(),
            topic,
            event_type: topic.event_type().to_string(),
            key: key.into(),
            timestamp: Utc::now(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Deserializes the payload into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.clone())
    }
}
