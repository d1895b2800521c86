//! In-memory order and stock-intent stores for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{NewOrder, Order, OrderStatus};

use crate::error::{Result, SagaError};
use crate::outbox::{IntentState, StockIntent, StockIntentStore};
use crate::store::{OrderPage, OrderQuery, OrderStore, OrderTx};

#[derive(Debug, Default)]
struct OrderState {
    orders: BTreeMap<OrderId, Order>,
    next_id: i64,
    fail_on_begin: bool,
    fail_on_commit: bool,
}

/// In-memory order store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<OrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes opening a unit of work fail.
    pub fn set_fail_on_begin(&self, fail: bool) {
        self.state.write().unwrap().fail_on_begin = fail;
    }

    /// Makes every commit fail, as if the database went away mid-saga.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.state.write().unwrap().fail_on_commit = fail;
    }

    /// Returns the number of committed orders.
    pub fn order_count(&self) -> usize {
        self.state.read().unwrap().orders.len()
    }

    /// Overwrites an order's status, bypassing the transition table.
    pub fn force_status(&self, id: OrderId, status: OrderStatus) {
        if let Some(order) = self.state.write().unwrap().orders.get_mut(&id) {
            order.apply_status(status, Utc::now());
        }
    }
}

/// Unit of work over [`InMemoryOrderStore`].
#[derive(Debug)]
pub struct InMemoryOrderTx {
    state: Arc<RwLock<OrderState>>,
    staged: Vec<Order>,
}

#[async_trait]
impl OrderTx for InMemoryOrderTx {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<Order> {
        let id = {
            let mut state = self.state.write().unwrap();
            if state.orders.values().any(|o| o.order_no == order.order_no)
                || self.staged.iter().any(|o| o.order_no == order.order_no)
            {
                return Err(SagaError::Store(format!(
                    "duplicate order number {}",
                    order.order_no
                )));
            }
            // Ids come from a sequence: a rolled-back insert still uses one.
            state.next_id += 1;
            OrderId::new(state.next_id)
        };
        let order = order.clone().into_order(id);
        self.staged.push(order.clone());
        Ok(order)
    }

    async fn commit(self) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_commit {
            return Err(SagaError::Store("commit failed".to_string()));
        }
        for order in self.staged {
            state.orders.insert(order.id, order);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    type Tx = InMemoryOrderTx;

    async fn begin(&self) -> Result<Self::Tx> {
        if self.state.read().unwrap().fail_on_begin {
            return Err(SagaError::Store("cannot open transaction".to_string()));
        }
        Ok(InMemoryOrderTx {
            state: self.state.clone(),
            staged: Vec::new(),
        })
    }

    async fn find(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().unwrap().orders.get(&id).cloned())
    }

    async fn find_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        Ok(self
            .state
            .read()
            .unwrap()
            .orders
            .values()
            .find(|o| o.order_no == order_no)
            .cloned())
    }

    async fn list_by_user(&self, query: &OrderQuery) -> Result<OrderPage> {
        let state = self.state.read().unwrap();
        let mut matches: Vec<&Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == query.user_id)
            .filter(|o| query.status.is_none_or(|s| o.status == s))
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Ok(OrderPage {
            total: matches.len() as i64,
            page: query.page,
            page_size: query.page_size,
            orders: matches
                .into_iter()
                .skip(query.offset() as usize)
                .take(query.page_size as usize)
                .cloned()
                .collect(),
        })
    }

    async fn transition_status(
        &self,
        id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Order>> {
        let mut state = self.state.write().unwrap();
        let Some(order) = state.orders.get_mut(&id).filter(|o| o.status == from) else {
            return Ok(None);
        };
        order.apply_status(to, at);
        Ok(Some(order.clone()))
    }
}

#[derive(Debug, Default)]
struct IntentRecords {
    intents: HashMap<String, StockIntent>,
    fail_on_save: bool,
}

/// In-memory stock-intent store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntentStore {
    state: Arc<RwLock<IntentRecords>>,
}

impl InMemoryIntentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every save fail.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.state.write().unwrap().fail_on_save = fail;
    }

    /// Returns the intent recorded for an order number.
    pub fn get(&self, order_no: &str) -> Option<StockIntent> {
        self.state.read().unwrap().intents.get(order_no).cloned()
    }

    /// Returns every intent in `state`.
    pub fn in_state(&self, state: IntentState) -> Vec<StockIntent> {
        self.state
            .read()
            .unwrap()
            .intents
            .values()
            .filter(|i| i.state == state)
            .cloned()
            .collect()
    }

    /// Backdates an intent so it looks abandoned.
    pub fn age(&self, order_no: &str, by: chrono::Duration) {
        if let Some(intent) = self.state.write().unwrap().intents.get_mut(order_no) {
            intent.updated_at -= by;
            intent.created_at -= by;
        }
    }
}

#[async_trait]
impl StockIntentStore for InMemoryIntentStore {
    async fn save(&self, intent: &StockIntent) -> Result<()> {
        let mut state = self.state.write().unwrap();
        if state.fail_on_save {
            return Err(SagaError::Store("intent store unavailable".to_string()));
        }
        state
            .intents
            .insert(intent.order_no.clone(), intent.clone());
        Ok(())
    }

    async fn find(&self, order_no: &str) -> Result<Option<StockIntent>> {
        Ok(self.get(order_no))
    }

    async fn list(
        &self,
        state: IntentState,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<StockIntent>> {
        let mut matches: Vec<StockIntent> = self
            .in_state(state)
            .into_iter()
            .filter(|i| i.updated_at < updated_before)
            .collect();
        matches.sort_by_key(|i| i.updated_at);
        matches.truncate(limit);
        Ok(matches)
    }
}
