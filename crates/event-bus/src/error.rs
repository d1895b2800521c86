use thiserror::Error;

/// Errors that can occur when publishing events or queueing work.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The transport rejected or failed to deliver the event.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// The queue is at capacity.
    #[error("Task queue is full")]
    QueueFull,

    /// The queue worker has shut down.
    #[error("Task queue is closed")]
    Closed,

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event bus operations.
pub type Result<T> = std::result::Result<T, EventBusError>;
