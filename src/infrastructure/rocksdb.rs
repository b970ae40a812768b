use crate::domain::inventory::{DecrementOutcome, InventoryItem};
use crate::domain::order::{
    Order, OrderItem, OrderSelector, OrderStatus, Transition, TransitionOutcome,
};
use crate::domain::payment::{Payment, PaymentUpsert};
use crate::domain::ports::{OrderStore, RetryQueue};
use crate::domain::retry::{JobStatus, RetryJob};
use crate::error::{ReconcileError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for order rows, keyed by order id.
pub const CF_ORDERS: &str = "orders";
/// Column Family for line items, one JSON array per order id.
pub const CF_ORDER_ITEMS: &str = "order_items";
/// Column Family for stock counters, keyed by product id.
pub const CF_INVENTORY: &str = "inventory";
/// Column Family for ledger rows, keyed by `order_id \x1f payment_ref`.
pub const CF_PAYMENTS: &str = "payments";
/// Index from payment reference to the ids of every order carrying it.
pub const CF_PAYMENT_REFS: &str = "payment_refs";
/// Column Family for the retry outbox, keyed by job id.
pub const CF_RETRY_JOBS: &str = "retry_jobs";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_ORDERS,
    CF_ORDER_ITEMS,
    CF_INVENTORY,
    CF_PAYMENTS,
    CF_PAYMENT_REFS,
    CF_RETRY_JOBS,
];

fn payment_key(order_id: &str, payment_ref: &str) -> Vec<u8> {
    format!("{order_id}\x1f{payment_ref}").into_bytes()
}

/// A persistent store implementation using RocksDB.
///
/// Each table lives in its own Column Family. Conditional updates are
/// serialized through `write_lock` and committed with a single `WriteBatch`,
/// so a predicate check and the rows it guards land together or not at all.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating any
    /// missing column families.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ReconcileError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    fn put_json<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<()> {
        let cf = self.cf(cf_name)?;
        batch.put_cf(cf, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn merged_payment(&self, upsert: &PaymentUpsert, now: SystemTime) -> Result<Payment> {
        let key = payment_key(&upsert.order_id, &upsert.payment_ref);
        Ok(match self.get_json::<Payment>(CF_PAYMENTS, &key)? {
            Some(mut existing) => {
                existing.merge(upsert, now);
                existing
            }
            None => Payment::from_upsert(upsert, now),
        })
    }

    /// Adds `order_id` to the orders indexed under `payment_ref`.
    fn index_payment_ref(
        &self,
        batch: &mut WriteBatch,
        payment_ref: &str,
        order_id: &str,
    ) -> Result<()> {
        let mut order_ids: Vec<String> = self
            .get_json(CF_PAYMENT_REFS, payment_ref.as_bytes())?
            .unwrap_or_default();
        if order_ids.iter().any(|id| id == order_id) {
            return Ok(());
        }
        order_ids.push(order_id.to_string());
        self.put_json(batch, CF_PAYMENT_REFS, payment_ref.as_bytes(), &order_ids)
    }

    fn selected_order(&self, transition: &Transition) -> Result<Option<Order>> {
        let order_ids: Vec<String> = match &transition.selector {
            OrderSelector::Checkout { order_id, .. } => vec![order_id.clone()],
            OrderSelector::PaymentRef(payment_ref) => self
                .get_json(CF_PAYMENT_REFS, payment_ref.as_bytes())?
                .unwrap_or_default(),
        };
        let mut candidates = Vec::with_capacity(order_ids.len());
        for order_id in &order_ids {
            if let Some(order) = self.get_json::<Order>(CF_ORDERS, order_id.as_bytes())? {
                candidates.push(order);
            }
        }
        Ok(transition.pick(&candidates).cloned())
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn try_transition(&self, transition: &Transition) -> Result<TransitionOutcome> {
        let _guard = self.write_lock.lock().await;

        let Some(mut order) = self.selected_order(transition)? else {
            return Ok(TransitionOutcome {
                applied: false,
                current: None,
            });
        };
        if !transition.matches(&order) {
            return Ok(TransitionOutcome {
                applied: false,
                current: Some(order),
            });
        }

        let now = SystemTime::now();
        order.apply(transition, now);

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        if let Some(payment_ref) = &transition.stamp_payment_ref {
            self.index_payment_ref(&mut batch, payment_ref, &order.id)?;
        }
        if let Some(intent) = &transition.ledger {
            let upsert = PaymentUpsert::completed(&order, &intent.payment_ref, &intent.method);
            let payment = self.merged_payment(&upsert, now)?;
            let key = payment_key(&payment.order_id, &payment.payment_ref);
            self.put_json(&mut batch, CF_PAYMENTS, &key, &payment)?;
        }
        self.db.write(batch)?;

        Ok(TransitionOutcome {
            applied: true,
            current: Some(order),
        })
    }

    async fn decrement_inventory(&self, order_id: &str) -> Result<DecrementOutcome> {
        let _guard = self.write_lock.lock().await;

        let mut order = self
            .get_json::<Order>(CF_ORDERS, order_id.as_bytes())?
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
        let items: Vec<OrderItem> = self
            .get_json(CF_ORDER_ITEMS, order_id.as_bytes())?
            .unwrap_or_default();

        // Several lines may hit the same product; fold them before writing.
        let mut touched: HashMap<String, InventoryItem> = HashMap::new();
        for line in &items {
            let stock = match touched.remove(&line.product_id) {
                Some(stock) => Some(stock),
                None => self.get_json::<InventoryItem>(CF_INVENTORY, line.product_id.as_bytes())?,
            };
            if let Some(mut stock) = stock {
                stock.decrement(line.quantity, now);
                touched.insert(stock.product_id.clone(), stock);
            }
        }

        order.inventory_committed = true;
        order.updated_at = now;

        let mut batch = WriteBatch::default();
        for stock in touched.values() {
            self.put_json(&mut batch, CF_INVENTORY, stock.product_id.as_bytes(), stock)?;
        }
        self.put_json(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        self.db.write(batch)?;

        let mut adjusted: Vec<InventoryItem> = touched.into_values().collect();
        adjusted.sort_by(|a, b| a.product_id.cmp(&b.product_id));
        Ok(DecrementOutcome {
            adjusted,
            already_applied: false,
        })
    }

    async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<Payment> {
        let _guard = self.write_lock.lock().await;

        let payment = self.merged_payment(&upsert, SystemTime::now())?;
        let key = payment_key(&payment.order_id, &payment.payment_ref);
        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_PAYMENTS, &key, &payment)?;
        self.db.write(batch)?;
        Ok(payment)
    }

    async fn mark_payments_failed(&self, payment_ref: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let now = SystemTime::now();
        let mut batch = WriteBatch::default();
        let mut changed = 0;
        for mut payment in self.scan_json::<Payment>(CF_PAYMENTS)? {
            if payment.payment_ref == payment_ref && payment.mark_failed(now) {
                let key = payment_key(&payment.order_id, &payment.payment_ref);
                self.put_json(&mut batch, CF_PAYMENTS, &key, &payment)?;
                changed += 1;
            }
        }
        if changed > 0 {
            self.db.write(batch)?;
        }
        Ok(changed)
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
        self.get_json(CF_ORDERS, order_id.as_bytes())
    }

    async fn order_items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
        Ok(self
            .get_json(CF_ORDER_ITEMS, order_id.as_bytes())?
            .unwrap_or_default())
    }

    async fn get_inventory(&self, product_id: &str) -> Result<Option<InventoryItem>> {
        self.get_json(CF_INVENTORY, product_id.as_bytes())
    }

    async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>> {
        Ok(self
            .scan_json::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.order_id == order_id)
            .collect())
    }

    async fn all_orders(&self) -> Result<Vec<Order>> {
        self.scan_json(CF_ORDERS)
    }

    async fn all_inventory(&self) -> Result<Vec<InventoryItem>> {
        self.scan_json(CF_INVENTORY)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>> {
        self.scan_json(CF_PAYMENTS)
    }

    async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if self
            .get_json::<Order>(CF_ORDERS, order.id.as_bytes())?
            .is_some()
        {
            return Err(ReconcileError::ValidationError(format!(
                "Order {} already exists",
                order.id
            )));
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_ORDERS, order.id.as_bytes(), &order)?;
        self.put_json(&mut batch, CF_ORDER_ITEMS, order.id.as_bytes(), &items)?;
        if let Some(payment_ref) = &order.payment_ref {
            self.index_payment_ref(&mut batch, payment_ref, &order.id)?;
        }
        self.db.write(batch)?;
        Ok(())
    }

    async fn stock_inventory(&self, item: InventoryItem) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_INVENTORY, item.product_id.as_bytes(), &item)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl RetryQueue for RocksDBStore {
    async fn enqueue(&self, job: RetryJob) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let key = job.dedupe_key();
        let duplicate = self.scan_json::<RetryJob>(CF_RETRY_JOBS)?.into_iter().any(|j| {
            matches!(j.status, JobStatus::Pending | JobStatus::InFlight) && j.dedupe_key() == key
        });
        if duplicate {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_RETRY_JOBS, job.id.as_bytes(), &job)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn claim_due(
        &self,
        worker_id: &str,
        now: SystemTime,
        lease: Duration,
        limit: usize,
    ) -> Result<Vec<RetryJob>> {
        let _guard = self.write_lock.lock().await;

        let mut due: Vec<RetryJob> = self
            .scan_json::<RetryJob>(CF_RETRY_JOBS)?
            .into_iter()
            .filter(|j| j.is_claimable(now))
            .collect();
        due.sort_by_key(|j| j.created_at);
        due.truncate(limit);

        let mut batch = WriteBatch::default();
        for job in &mut due {
            job.claim(worker_id, now, lease);
            self.put_json(&mut batch, CF_RETRY_JOBS, job.id.as_bytes(), &*job)?;
        }
        if !due.is_empty() {
            self.db.write(batch)?;
        }
        Ok(due)
    }

    async fn complete(&self, id: Uuid, worker_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut job) = self.get_json::<RetryJob>(CF_RETRY_JOBS, id.as_bytes())? else {
            return Ok(false);
        };
        if job.status != JobStatus::InFlight || job.locked_by.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        job.complete(SystemTime::now());

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_RETRY_JOBS, id.as_bytes(), &job)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn release(
        &self,
        id: Uuid,
        worker_id: &str,
        error: &str,
        max_attempts: u32,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;

        let Some(mut job) = self.get_json::<RetryJob>(CF_RETRY_JOBS, id.as_bytes())? else {
            return Ok(false);
        };
        if job.status != JobStatus::InFlight || job.locked_by.as_deref() != Some(worker_id) {
            return Ok(false);
        }
        job.release(error, max_attempts, SystemTime::now());

        let mut batch = WriteBatch::default();
        self.put_json(&mut batch, CF_RETRY_JOBS, id.as_bytes(), &job)?;
        self.db.write(batch)?;
        Ok(true)
    }

    async fn all_jobs(&self) -> Result<Vec<RetryJob>> {
        let mut jobs = self.scan_json::<RetryJob>(CF_RETRY_JOBS)?;
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}
