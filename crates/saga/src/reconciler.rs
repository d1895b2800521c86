//! Background pass over the stock-intent outbox.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use event_bus::{EventPublisher, IntegrationEvent, Topic};
use serde::Serialize;
use tokio::time::MissedTickBehavior;

use crate::clients::ProductClient;
use crate::config::SagaConfig;
use crate::error::Result;
use crate::events::{StockCompensationFailed, StockLineEvent};
use crate::outbox::{IntentState, StockIntent, StockIntentStore};
use crate::store::OrderStore;

/// Counts of what one reconciler pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Restorations attempted again and failed.
    pub retried: usize,
    /// Restorations that went through.
    pub compensated: usize,
    /// Intents given up on and reported.
    pub exhausted: usize,
    /// Stale pending intents whose order turned out to be committed.
    pub applied: usize,
    /// Stale pending intents with no order behind them.
    pub unresolved: usize,
}

impl ReconcileReport {
    /// Returns true if the pass found nothing to do.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Retries failed stock restorations and settles abandoned intents.
pub struct StockReconciler<P, I, O> {
    products: P,
    intents: I,
    orders: O,
    publisher: Arc<dyn EventPublisher>,
    config: SagaConfig,
}

impl<P, I, O> StockReconciler<P, I, O>
where
    P: ProductClient,
    I: StockIntentStore,
    O: OrderStore,
{
    /// Creates a reconciler with default tunables.
    pub fn new(products: P, intents: I, orders: O, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            products,
            intents,
            orders,
            publisher,
            config: SagaConfig::default(),
        }
    }

    /// Replaces the tunables.
    pub fn with_config(mut self, config: SagaConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs one pass: failed compensations first, then stale pending intents.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let now = Utc::now();

        let failed = self
            .intents
            .list(
                IntentState::CompensationFailed,
                now,
                self.config.reconcile_batch_size,
            )
            .await?;
        for mut intent in failed {
            if let Err(e) = self.retry_restoration(&mut intent, &mut report).await {
                tracing::warn!(order_no = %intent.order_no, error = %e, "stock intent not reconciled");
            }
        }

        let stale_after = chrono::Duration::from_std(self.config.stale_intent_after)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let stale = self
            .intents
            .list(
                IntentState::Pending,
                now - stale_after,
                self.config.reconcile_batch_size,
            )
            .await?;
        for mut intent in stale {
            if let Err(e) = self.settle_stale(&mut intent, &mut report).await {
                tracing::warn!(order_no = %intent.order_no, error = %e, "stale stock intent not settled");
            }
        }

        Ok(report)
    }

    /// Runs a pass every `every` until `shutdown` resolves.
    pub async fn run(&self, every: Duration, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.run_once().await {
                    Ok(report) if !report.is_empty() => {
                        tracing::info!(?report, "stock reconciler pass");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "stock reconciler pass failed"),
                },
            }
        }
        tracing::debug!("stock reconciler stopped");
    }

    async fn retry_restoration(
        &self,
        intent: &mut StockIntent,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let max = self.config.max_compensation_retries;
        if intent.retry_count >= max {
            return self.exhaust(intent, report).await;
        }

        match self.products.batch_update_stock(&intent.restoration()).await {
            Ok(()) => {
                intent.transition(IntentState::Compensated)?;
                self.intents.save(intent).await?;
                metrics::counter!("stock_compensations_total", "outcome" => "reconciled")
                    .increment(1);
                tracing::info!(order_no = %intent.order_no, attempts = intent.retry_count + 1, "stock restored on retry");
                report.compensated += 1;
                Ok(())
            }
            Err(e) => {
                intent.compensation_failed(e.to_string())?;
                report.retried += 1;
                tracing::warn!(
                    order_no = %intent.order_no,
                    retry_count = intent.retry_count,
                    error = %e,
                    "stock restoration retry failed"
                );
                if intent.retry_count >= max {
                    self.exhaust(intent, report).await
                } else {
                    self.intents.save(intent).await
                }
            }
        }
    }

    async fn exhaust(&self, intent: &mut StockIntent, report: &mut ReconcileReport) -> Result<()> {
        intent.transition(IntentState::Exhausted)?;
        self.intents.save(intent).await?;
        report.exhausted += 1;

        metrics::counter!("stock_compensation_exhausted_total").increment(1);
        tracing::error!(
            order_no = %intent.order_no,
            retry_count = intent.retry_count,
            last_error = intent.last_error.as_deref().unwrap_or_default(),
            "CRITICAL_STOCK_COMPENSATION_FAILED: retries exhausted"
        );

        let payload = StockCompensationFailed {
            order_no: intent.order_no.clone(),
            user_id: intent.user_id,
            items: StockLineEvent::from_restoration(&intent.restoration()),
            original_error: "compensation retries exhausted".to_string(),
            compensation_error: intent.last_error.clone().unwrap_or_default(),
            retry_count: intent.retry_count,
            max_retries: self.config.max_compensation_retries,
        };
        let event = IntegrationEvent::new(Topic::StockCompensationFailed, &intent.order_no, &payload)?;
        if let Err(e) = self.publisher.publish(event).await {
            tracing::error!(order_no = %intent.order_no, error = %e, "dead-letter event not published");
        }
        Ok(())
    }

    async fn settle_stale(
        &self,
        intent: &mut StockIntent,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        if self.orders.find_by_no(&intent.order_no).await?.is_some() {
            intent.transition(IntentState::Applied)?;
            self.intents.save(intent).await?;
            tracing::info!(order_no = %intent.order_no, "stale stock intent backed by an order");
            report.applied += 1;
            return Ok(());
        }

        intent.transition(IntentState::Unresolved)?;
        self.intents.save(intent).await?;
        report.unresolved += 1;
        metrics::counter!("stock_intents_unresolved_total").increment(1);
        tracing::error!(
            order_no = %intent.order_no,
            user_id = %intent.user_id,
            items = ?intent.deltas,
            "stock intent abandoned without an order; deduction outcome unknown"
        );
        Ok(())
    }
}
