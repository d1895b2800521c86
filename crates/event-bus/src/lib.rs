//! Asynchronous notification of state changes.
//!
//! Services describe what happened as an [`IntegrationEvent`] and hand it to
//! an [`EventPublisher`]. Side effects that must not hold up a caller's
//! response go through the [`TaskQueue`], which runs them off the request
//! path with per-attempt timeouts and bounded retries.

pub mod error;
pub mod event;
pub mod publisher;
pub mod queue;

pub use error::{EventBusError, Result};
pub use event::{EventId, IntegrationEvent, Topic};
pub use publisher::{EventPublisher, InMemoryEventPublisher, LogPublisher};
pub use queue::{RetryPolicy, TaskFuture, TaskQueue, TaskWorker};
