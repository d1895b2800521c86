//! Stock-intent outbox.
//!
//! The stock deduction runs on another service, outside the local order
//! transaction. Before calling it, the saga records what it is about to take
//! so that a crash, a timeout or a failed compensation always leaves a row
//! the reconciler can act on.
//!
//! ```text
//! Pending ──► Aborted                      (deduction refused, nothing held)
//!    │
//!    ├──► Applied ──► Compensated           (order cancelled, stock back)
//!    │       │
//!    │       └──► CompensationFailed ──► Compensated | Exhausted
//!    │
//!    ├──► Compensated                       (commit failed, stock back)
//!    ├──► CompensationFailed
//!    └──► Unresolved                        (stale, no order: needs a human)
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use domain::{DomainError, StockDelta};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SagaError};

/// Where a recorded deduction stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    /// Recorded; the deduction may or may not have run.
    Pending,
    /// The ledger refused the deduction.
    Aborted,
    /// Deducted and backed by a committed order.
    Applied,
    /// Stock handed back.
    Compensated,
    /// Handing stock back failed; the reconciler retries.
    CompensationFailed,
    /// Retries used up; reported on the dead-letter topic.
    Exhausted,
    /// Abandoned while pending with no order behind it. Whether the ledger
    /// applied the batch is unknown, so it is never restored automatically.
    Unresolved,
}

impl IntentState {
    /// Returns the states reachable from this one.
    pub fn allowed_transitions(&self) -> &'static [IntentState] {
        match self {
            IntentState::Pending => &[
                IntentState::Aborted,
                IntentState::Applied,
                IntentState::Compensated,
                IntentState::CompensationFailed,
                IntentState::Unresolved,
            ],
            IntentState::Applied => &[IntentState::Compensated, IntentState::CompensationFailed],
            IntentState::CompensationFailed => &[
                IntentState::CompensationFailed,
                IntentState::Compensated,
                IntentState::Exhausted,
            ],
            IntentState::Aborted
            | IntentState::Compensated
            | IntentState::Exhausted
            | IntentState::Unresolved => &[],
        }
    }

    /// Returns true if the intent may move to `next`.
    pub fn can_transition_to(&self, next: IntentState) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if no automatic step will touch the intent again.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns the state name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentState::Pending => "pending",
            IntentState::Aborted => "aborted",
            IntentState::Applied => "applied",
            IntentState::Compensated => "compensated",
            IntentState::CompensationFailed => "compensation_failed",
            IntentState::Exhausted => "exhausted",
            IntentState::Unresolved => "unresolved",
        }
    }

    /// All states.
    pub fn all() -> [IntentState; 7] {
        [
            IntentState::Pending,
            IntentState::Aborted,
            IntentState::Applied,
            IntentState::Compensated,
            IntentState::CompensationFailed,
            IntentState::Exhausted,
            IntentState::Unresolved,
        ]
    }
}

impl std::fmt::Display for IntentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntentState {
    type Err = DomainError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IntentState::all()
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// A deduction the saga is about to make, keyed by order number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIntent {
    pub order_no: String,
    pub user_id: UserId,
    /// The deduction as sent to the ledger (negative deltas).
    pub deltas: Vec<StockDelta>,
    pub state: IntentState,
    /// Failed restoration attempts so far.
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StockIntent {
    /// Records a deduction about to be sent.
    pub fn pending(order_no: impl Into<String>, user_id: UserId, deltas: Vec<StockDelta>) -> Self {
        let now = Utc::now();
        Self {
            order_no: order_no.into(),
            user_id,
            deltas,
            state: IntentState::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds the intent of an order that was committed before its intent
    /// could be found.
    pub fn applied(order_no: impl Into<String>, user_id: UserId, deltas: Vec<StockDelta>) -> Self {
        Self {
            state: IntentState::Applied,
            ..Self::pending(order_no, user_id, deltas)
        }
    }

    /// The deltas that hand the deducted stock back.
    pub fn restoration(&self) -> Vec<StockDelta> {
        self.deltas.iter().map(StockDelta::inverse).collect()
    }

    /// Moves to `next`, stamping the update time.
    pub fn transition(&mut self, next: IntentState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SagaError::InvalidIntentTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a failed restoration.
    pub fn compensation_failed(&mut self, error: impl Into<String>) -> Result<()> {
        let retrying = self.state == IntentState::CompensationFailed;
        self.transition(IntentState::CompensationFailed)?;
        if retrying {
            self.retry_count += 1;
        }
        self.last_error = Some(error.into());
        Ok(())
    }
}

/// Durable storage for stock intents.
#[async_trait]
pub trait StockIntentStore: Send + Sync {
    /// Inserts or replaces the intent for its order number.
    async fn save(&self, intent: &StockIntent) -> Result<()>;

    /// Returns the intent for an order number.
    async fn find(&self, order_no: &str) -> Result<Option<StockIntent>>;

    /// Returns up to `limit` intents in `state` last updated before
    /// `updated_before`, oldest first.
    async fn list(
        &self,
        state: IntentState,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StockIntent>>;
}

#[async_trait]
impl<T: StockIntentStore + ?Sized> StockIntentStore for Arc<T> {
    async fn save(&self, intent: &StockIntent) -> Result<()> {
        (**self).save(intent).await
    }

    async fn find(&self, order_no: &str) -> Result<Option<StockIntent>> {
        (**self).find(order_no).await
    }

    async fn list(
        &self,
        state: IntentState,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StockIntent>> {
        (**self).list(state, updated_before, limit).await
    }
}
