use crate::domain::inventory::{DecrementOutcome, InventoryItem};
use crate::domain::order::{Order, OrderItem, OrderStatus, Transition, TransitionOutcome};
use crate::domain::payment::{Payment, PaymentUpsert};
use crate::domain::ports::{OrderStore, RetryQueue};
use crate::domain::retry::{JobStatus, RetryJob};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    orders: HashMap<String, Order>,
    items: HashMap<String, Vec<OrderItem>>,
    inventory: HashMap<String, InventoryItem>,
    payments: Vec<Payment>,
}

impl Tables {
    fn select(&self, transition: &Transition) -> Option<String> {
        transition
            .pick(self.orders.values())
            .map(|order| order.id.clone())
    }

    fn upsert_payment(&mut self, upsert: &PaymentUpsert, now: SystemTime) -> Payment {
        if let Some(existing) = self
            .payments
            .iter_mut()
            .find(|p| p.is_keyed_by(&upsert.order_id, &upsert.payment_ref))
        {
            existing.merge(upsert, now);
            return existing.clone();
        }
        let payment = Payment::from_upsert(upsert, now);
        self.payments.push(payment.clone());
        payment
    }
}

/// A thread-safe in-memory order store.
///
/// All tables sit behind one `RwLock`, so every conditional update is
/// evaluated and applied under a single write guard. Cloning shares state.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn try_transition(&self, transition: &Transition) -> Result<TransitionOutcome> {
        let mut tables = self.tables.write().await;
        let Some(order_id) = tables.select(transition) else {
            return Ok(TransitionOutcome {
                applied: false,
                current: None,
            });
        };

        let now = SystemTime::now();
        let current = {
            let Some(order) = tables.orders.get_mut(&order_id) else {
                return Ok(TransitionOutcome {
                    applied: false,
                    current: None,
                });
            };
            if !transition.matches(order) {
                return Ok(TransitionOutcome {
                    applied: false,
                    current: Some(order.clone()),
                });
            }
            order.apply(transition, now);
            order.clone()
        };

        if let Some(intent) = &transition.ledger {
            let upsert = PaymentUpsert::completed(&current, &intent.payment_ref, &intent.method);
            tables.upsert_payment(&upsert, now);
        }

        Ok(TransitionOutcome {
            applied: true,
            current: Some(current),
        })
    }

    async fn decrement_inventory(&self, order_id: &str) -> Result<DecrementOutcome> {
        let mut tables = self.tables.write().await;
        let tables = &mut *tables;

        let order = tables
            .orders
            .get_mut(order_id)
            .ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;
        if order.status != OrderStatus::Paid {
            return Err(ReconcileError::ValidationError(format!(
                "Order {order_id} is {}, inventory is only decremented for PAID orders",
                order.status
            )));
        }
        if order.inventory_committed {
            return Ok(DecrementOutcome {
                adjusted: Vec::new(),
                already_applied: true,
            });
        }

        let now = SystemTime::now();
        let mut adjusted = Vec::new();
        for line in tables.items.get(order_id).into_iter().flatten() {
            if let Some(stock) = tables.inventory.get_mut(&line.product_id) {
                stock.decrement(line.quantity, now);
                adjusted.push(stock.clone());
            }
        }
        order.inventory_committed = true;
        order.updated_at = now;

        Ok(DecrementOutcome {
            adjusted,
            already_applied: false,
        })
    }

    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<Payment> {
        let mut tables = self.tables.write().await;
        Ok(tables.upsert_payment(&upsert, SystemTime::now()))
    }

    async fn mark_payments_failed(&self, payment_ref: &str) -> Result<usize> {
        let mut tables = self.tables.write().await;
        let now = SystemTime::now();
        Ok(tables
            .payments
            .iter_mut()
            .filter(|p| p.payment_ref == payment_ref)
            .map(|p| p.mark_failed(now))
            .filter(|changed| *changed)
            .count())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn order_items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        let tables = self.tables.read().await;
        Ok(tables.items.get(order_id).cloned().unwrap_or_default())
    }

    async fn get_inventory(&self, product_id: &str) -> Result<Option<InventoryItem>> {
        let tables = self.tables.read().await;
        Ok(tables.inventory.get(product_id).cloned())
    }

    async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables.orders.values().cloned().collect();
        orders.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(orders)
    }

    async fn all_inventory(&self) -> Result<Vec<InventoryItem>> {
        let tables = self.tables.read().await;
        let mut items: Vec<InventoryItem> = tables.inventory.values().cloned().collect();
        items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(items)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.clone())
    }

    async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(ReconcileError::ValidationError(format!(
                "Order {} already exists",
                order.id
            )));
        }
        tables.items.insert(order.id.clone(), items);
        tables.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn stock_inventory(&self, item: InventoryItem) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.inventory.insert(item.product_id.clone(), item);
        Ok(())
    }
}

/// A thread-safe in-memory retry outbox.
#[derive(Default, Clone)]
pub struct InMemoryRetryQueue {
    jobs: Arc<RwLock<HashMap<Uuid, RetryJob>>>,
}

impl InMemoryRetryQueue {
    /// Creates a new, empty in-memory retry queue.
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_open(job: &RetryJob) -> bool {
    matches!(job.status, JobStatus::Pending | JobStatus::InFlight)
}

fn holds_lease(job: &RetryJob, worker_id: &str) -> bool {
    job.status == JobStatus::InFlight && job.locked_by.as_deref() == Some(worker_id)
}

#[async_trait]
impl RetryQueue for InMemoryRetryQueue {
    async fn enqueue(&self, job: RetryJob) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let key = job.dedupe_key();
        if jobs.values().any(|j| is_open(j) && j.dedupe_key() == key) {
            return Ok(false);
        }
        jobs.insert(job.id, job);
        Ok(true)
    }

    async fn claim_due(
        &self,
        worker_id: &str,
        now: SystemTime,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<RetryJob>> {
        let mut jobs = self.jobs.write().await;
        let mut due: Vec<&mut RetryJob> = jobs
            .values_mut()
            .filter(|j| j.is_claimable(now))
            .collect();
        due.sort_by_key(|j| j.created_at);

        Ok(due
            .into_iter()
            .take(limit)
            .map(|job| {
                job.claim(worker_id, now, lease);
                job.clone()
            })
            .collect())
    }

    async fn complete(&self, id: Uuid, worker_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if holds_lease(job, worker_id) => {
                job.complete(SystemTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(
        &self,
        id: Uuid,
        worker_id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if holds_lease(job, worker_id) => {
                job.release(error, max_attempts, SystemTime::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn all_jobs(&self) -> Result<Vec<RetryJob>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<RetryJob> = jobs.values().cloned().collect();
        all.sort_by_key(|j| j.created_at);
        Ok(all)
    }
}
