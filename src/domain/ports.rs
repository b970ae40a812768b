use super::inventory::{DecrementOutcome, InventoryItem};
use super::order::{Order, OrderItem, Transition, TransitionOutcome};
use super::payment::{Payment, PaymentUpsert};
use super::retry::RetryJob;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Transactional surface over orders, line items, inventory and payments.
///
/// Every mutating method is a conditional update evaluated atomically by the
/// implementation; callers never read-then-write.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Applies `transition` to the row chosen by [`Transition::pick`], so
    /// every adapter targets the same order when a payment reference is
    /// shared.
    ///
    /// When the transition carries a ledger intent and applies, the completed
    /// payment is written in the same atomic unit.
    async fn try_transition(&self, transition: &Transition) -> Result<TransitionOutcome>;

    /// Decrements stock for every line item of a `PAID` order, once per order.
    async fn decrement_inventory(&self, order_id: &str) -> Result<DecrementOutcome>;

    /// Inserts or updates the ledger row keyed by (`order_id`, `payment_ref`).
    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<Payment>;

    /// Marks every ledger row for `payment_ref` as failed. Returns rows changed.
    async fn mark_payments_failed(&self, payment_ref: &str) -> Result<usize>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>>;
    async fn order_items(&self, order_id: &str) -> Result<Vec<OrderItem>>;
    async fn get_inventory(&self, product_id: &str) -> Result<Option<InventoryItem>>;
    async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>>;
    async fn all_orders(&self) -> Result<Vec<Order>>;
    async fn all_inventory(&self) -> Result<Vec<InventoryItem>>;
    async fn all_payments(&self) -> Result<Vec<Payment>>;

    /// Seeds an order created by the upstream checkout flow.
    async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> Result<()>;
    /// Seeds or overwrites a stock row.
    async fn stock_inventory(&self, item: InventoryItem) -> Result<()>;
}

/// Durable outbox of secondary effects awaiting a retry.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Records a job unless one with the same dedupe key already exists.
    /// Returns whether a new job was stored.
    async fn enqueue(&self, job: RetryJob) -> Result<bool>;

    /// Atomically leases up to `limit` claimable jobs to `worker_id`.
    async fn claim_due(
        &self,
        worker_id: &str,
        now: SystemTime,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<RetryJob>>;

    /// Marks a job done, only if `worker_id` still holds its lease.
    async fn complete(&self, id: Uuid, worker_id: &str) -> Result<bool>;

    /// Records a failed attempt, only if `worker_id` still holds its lease.
    async fn release(&self, id: Uuid, worker_id: &str, error: &str, max_attempts: u32)
    -> Result<bool>;

    async fn all_jobs(&self) -> Result<Vec<RetryJob>>;
}

pub type OrderStoreRef = Arc<dyn OrderStore>;
pub type RetryQueueRef = Arc<dyn RetryQueue>;
