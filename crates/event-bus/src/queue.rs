//! Background task queue with retry and backoff.
//!
//! Request handlers hand side effects to the queue by message passing; a
//! worker task receives them and runs each one independently, so tasks carry
//! no ordering guarantee relative to each other.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use crate::error::{EventBusError, Result};
use crate::event::IntegrationEvent;
use crate::publisher::EventPublisher;

/// Future returned by one attempt of a queued task.
pub type TaskFuture = BoxFuture<'static, std::result::Result<(), String>>;

type Job = Box<dyn Fn() -> TaskFuture + Send + Sync>;

struct Task {
    name: &'static str,
    key: String,
    job: Job,
}

/// Retry settings applied to every queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
    /// Delay before the second attempt; doubled for each later one.
    pub initial_backoff: Duration,
    /// Upper bound on the delay between attempts.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Returns the delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Handle used to enqueue background work.
///
/// Cloning the handle shares the same worker.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Task>,
    pending: Arc<watch::Sender<usize>>,
}

/// Receiving half of a [`TaskQueue`]; drive it with [`TaskWorker::run`].
pub struct TaskWorker {
    receiver: mpsc::Receiver<Task>,
    pending: Arc<watch::Sender<usize>>,
    policy: RetryPolicy,
}

impl TaskQueue {
    /// Creates a queue and its worker without starting the worker.
    pub fn new(capacity: usize, policy: RetryPolicy) -> (Self, TaskWorker) {
        let (sender, receiver) = mpsc::channel(capacity);
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        (
            Self {
                sender,
                pending: pending.clone(),
            },
            TaskWorker {
                receiver,
                pending,
                policy,
            },
        )
    }

    /// Creates a queue and spawns its worker on the current runtime.
    pub fn spawn(capacity: usize, policy: RetryPolicy) -> Self {
        let (queue, worker) = Self::new(capacity, policy);
        tokio::spawn(worker.run());
        queue
    }

    /// Enqueues a task without waiting.
    ///
    /// `job` is called once per attempt. A full or closed queue drops the
    /// task and reports why; the caller's own operation is unaffected.
    pub fn submit<F>(&self, name: &'static str, key: impl Into<String>, job: F) -> Result<()>
    where
        F: Fn() -> TaskFuture + Send + Sync + 'static,
    {
        let task = Task {
            name,
            key: key.into(),
            job: Box::new(job),
        };

        self.pending.send_modify(|n| *n += 1);
        match self.sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.pending.send_modify(|n| *n -= 1);
                let (reason, error) = match err {
                    mpsc::error::TrySendError::Full(_) => ("full", EventBusError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => ("closed", EventBusError::Closed),
                };
                metrics::counter!("background_tasks_dropped_total", "reason" => reason)
                    .increment(1);
                tracing::warn!(task = name, reason, "background task dropped");
                Err(error)
            }
        }
    }

    /// Enqueues publication of an event, logging instead of failing.
    pub fn publish(&self, publisher: Arc<dyn EventPublisher>, event: IntegrationEvent) {
        let key = event.key.clone();
        let result = self.submit("publish_event", key, move || {
            let publisher = publisher.clone();
            let event = event.clone();
            Box::pin(async move { publisher.publish(event).await.map_err(|e| e.to_string()) })
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "event not queued");
        }
    }

    /// Returns the number of tasks queued or running.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Waits until every queued task has finished.
    pub async fn wait_idle(&self) {
        let mut receiver = self.pending.subscribe();
        let _ = receiver.wait_for(|n| *n == 0).await;
    }
}

impl TaskWorker {
    /// Receives tasks until every [`TaskQueue`] handle is dropped.
    pub async fn run(mut self) {
        while let Some(task) = self.receiver.recv().await {
            let done = PendingGuard(self.pending.clone());
            let policy = self.policy;
            tokio::spawn(async move {
                let _done = done;
                run_with_retry(task, policy).await;
            });
        }
        tracing::debug!("task queue closed");
    }
}

/// Marks one task finished when dropped, even if the task panicked.
struct PendingGuard(Arc<watch::Sender<usize>>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

async fn run_with_retry(task: Task, policy: RetryPolicy) {
    let start = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let outcome = match tokio::time::timeout(policy.attempt_timeout, (task.job)()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(format!("timed out after {:?}", policy.attempt_timeout)),
        };

        match outcome {
            Ok(()) => {
                metrics::counter!("background_tasks_total", "outcome" => "success").increment(1);
                metrics::histogram!("background_task_duration_seconds")
                    .record(start.elapsed().as_secs_f64());
                tracing::debug!(task = task.name, key = %task.key, attempt, "background task done");
                return;
            }
            Err(error) if attempt < policy.max_attempts => {
                let delay = policy.backoff_after(attempt);
                tracing::warn!(
                    task = task.name,
                    key = %task.key,
                    attempt,
                    error = %error,
                    retry_in_ms = delay.as_millis() as u64,
                    "background task failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                metrics::counter!("background_tasks_total", "outcome" => "failed").increment(1);
                tracing::error!(
                    task = task.name,
                    key = %task.key,
                    attempts = attempt,
                    error = %error,
                    "background task gave up"
                );
                return;
            }
        }
    }
}
