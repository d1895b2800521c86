//! Event publisher trait and implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{EventBusError, Result};
use crate::event::{IntegrationEvent, Topic};

/// Delivers integration events to downstream consumers.
///
/// Delivery is at-least-once: a retried publish may duplicate an event, and
/// consumers deduplicate by `event_id`.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes a single event.
    async fn publish(&self, event: IntegrationEvent) -> Result<()>;
}

#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        (**self).publish(event).await
    }
}

/// Publisher that writes each event to the tracing log.
///
/// Used when no broker is configured.
#[derive(Debug, Clone, Default)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        let data = serde_json::to_string(&event.data)?;
        tracing::info!(
            topic = %event.topic,
            key = %event.key,
            event_id = %event.event_id,
            data = %data,
            "event published"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryPublisherState {
    events: Vec<IntegrationEvent>,
    fail_on_publish: bool,
    attempts: usize,
}

/// In-memory publisher for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventPublisher {
    state: Arc<RwLock<InMemoryPublisherState>>,
}

impl InMemoryEventPublisher {
    /// Creates a new in-memory publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail every publish call.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.state.write().unwrap().fail_on_publish = fail;
    }

    /// Returns every event published so far, in publish order.
    pub fn published(&self) -> Vec<IntegrationEvent> {
        self.state.read().unwrap().events.clone()
    }

    /// Returns the events published to one topic.
    pub fn published_to(&self, topic: Topic) -> Vec<IntegrationEvent> {
        self.state
            .read()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns the number of publish calls, including failed ones.
    pub fn attempts(&self) -> usize {
        self.state.read().unwrap().attempts
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: IntegrationEvent) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.fail_on_publish {
            return Err(EventBusError::Publish("broker unavailable".to_string()));
        }

        state.events.push(event);
        Ok(())
    }
}
