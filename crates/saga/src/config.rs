use std::time::Duration;

/// Tunables for the order saga and its reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SagaConfig {
    /// Restoration attempts before a failed compensation is given up on.
    pub max_compensation_retries: u32,
    /// Age after which a pending stock intent is considered abandoned.
    pub stale_intent_after: Duration,
    /// Maximum intents handled per reconciler pass and state.
    pub reconcile_batch_size: usize,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_compensation_retries: 10,
            stale_intent_after: Duration::from_secs(300),
            reconcile_batch_size: 100,
        }
    }
}
