use super::config::{EngineConfig, LedgerWrite};
use crate::domain::event::PaymentEvent;
use crate::domain::inventory::DecrementOutcome;
use crate::domain::money::Money;
use crate::domain::order::{LedgerIntent, Order, OrderStatus, Transition};
use crate::domain::payment::{Payment, PaymentUpsert};
use crate::domain::ports::{OrderStoreRef, RetryQueueRef};
use crate::domain::retry::{RetryJob, RetryKind};
use crate::error::{ReconcileError, Result};
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

/// Why an event changed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoOpReason {
    /// The order already left the status the event expects.
    AlreadyResolved {
        order_id: String,
        status: OrderStatus,
    },
    /// No order carries this payment reference.
    Unmatched { payment_ref: String },
}

impl fmt::Display for NoOpReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoOpReason::AlreadyResolved { order_id, status } => {
                write!(f, "order {order_id} already {status}")
            }
            NoOpReason::Unmatched { payment_ref } => {
                write!(f, "no order for payment {payment_ref}")
            }
        }
    }
}

/// What applying one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied {
        order_id: String,
        status: OrderStatus,
    },
    NoOp(NoOpReason),
}

/// Applies canonical payment events to the order aggregate.
///
/// Every status change is a single conditional write whose predicate carries
/// both the order identity and the expected prior status. Duplicate or racing
/// deliveries therefore resolve to exactly one applied transition; the losers
/// observe "no row matched" and report a no-op.
///
/// Inventory and (in best-effort mode) ledger writes run after the transition
/// and never fail it. When they fail they are queued on the retry outbox.
pub struct ReconciliationEngine {
    store: OrderStoreRef,
    retries: RetryQueueRef,
    config: EngineConfig,
}

impl ReconciliationEngine {
    pub fn new(store: OrderStoreRef, retries: RetryQueueRef, config: EngineConfig) -> Self {
        Self {
            store,
            retries,
            config,
        }
    }

    pub async fn apply(&self, event: PaymentEvent) -> Result<Outcome> {
        match event {
            PaymentEvent::CheckoutCompleted {
                order_id,
                session_id,
                payment_ref,
                amount,
            } => {
                self.apply_checkout_completed(&order_id, &session_id, &payment_ref, amount.as_ref())
                    .await
            }
            PaymentEvent::PaymentSucceeded { payment_ref } => {
                self.apply_payment_succeeded(&payment_ref).await
            }
            PaymentEvent::PaymentFailed { payment_ref } => {
                self.apply_payment_failed(&payment_ref).await
            }
        }
    }

    #[instrument(skip(self, amount))]
    pub async fn apply_checkout_completed(
        &self,
        order_id: &str,
        session_ref: &str,
        payment_ref: &str,
        amount: Option<&Money>,
    ) -> Result<Outcome> {
        let transition = self.with_ledger(
            Transition::checkout_completed(order_id, session_ref, payment_ref),
            payment_ref,
        );
        let outcome = self.store.try_transition(&transition).await?;

        let Some(order) = outcome.current else {
            return Err(ReconcileError::OrderNotFound(order_id.to_string()));
        };

        if !outcome.applied {
            // Unstamped or replaced session: the provider must redeliver.
            if order.session_ref.as_deref() != Some(session_ref) {
                warn!(
                    order_id = %order.id,
                    expected = ?order.session_ref,
                    "Checkout session does not match order"
                );
                return Err(ReconcileError::SessionMismatch(order.id));
            }
            if order.status == OrderStatus::Cancelled {
                warn!(order_id = %order.id, "Checkout completed for a cancelled order, ignoring");
            } else {
                info!(order_id = %order.id, status = %order.status, "Checkout already applied");
            }
            return Ok(Outcome::NoOp(NoOpReason::AlreadyResolved {
                order_id: order.id,
                status: order.status,
            }));
        }

        if let Some(amount) = amount
            && !amount.same_value(&order.total)
        {
            warn!(
                order_id = %order.id,
                charged = %amount,
                total = %order.total,
                "Checkout amount differs from order total"
            );
        }

        self.settle(&order, payment_ref).await;
        info!(order_id = %order.id, "Order marked PAID from checkout");
        Ok(Outcome::Applied {
            order_id: order.id,
            status: order.status,
        })
    }

    #[instrument(skip(self))]
    pub async fn apply_payment_succeeded(&self, payment_ref: &str) -> Result<Outcome> {
        let transition =
            self.with_ledger(Transition::payment_succeeded(payment_ref), payment_ref);
        let outcome = self.store.try_transition(&transition).await?;

        match outcome.current {
            Some(order) if outcome.applied => {
                self.settle(&order, payment_ref).await;
                info!(order_id = %order.id, "Order marked PAID from payment confirmation");
                Ok(Outcome::Applied {
                    order_id: order.id,
                    status: order.status,
                })
            }
            current => Ok(Outcome::NoOp(no_match(payment_ref, current))),
        }
    }

    #[instrument(skip(self))]
    pub async fn apply_payment_failed(&self, payment_ref: &str) -> Result<Outcome> {
        let outcome = self
            .store
            .try_transition(&Transition::payment_failed(payment_ref))
            .await?;

        match outcome.current {
            Some(order) if outcome.applied => {
                if let Err(e) = self.mark_payments_failed(&order.id, payment_ref).await {
                    warn!(order_id = %order.id, error = %e, "Failed to update payment status");
                    self.defer(RetryKind::MarkPaymentsFailed, &order.id, Some(payment_ref), &e)
                        .await;
                }
                info!(order_id = %order.id, "Order CANCELLED after failed payment");
                Ok(Outcome::Applied {
                    order_id: order.id,
                    status: order.status,
                })
            }
            current => Ok(Outcome::NoOp(no_match(payment_ref, current))),
        }
    }

    /// Decrements stock for a PAID order. Safe to call repeatedly.
    pub async fn decrement_inventory(&self, order_id: &str) -> Result<DecrementOutcome> {
        let outcome = self.store.decrement_inventory(order_id).await?;
        if outcome.already_applied {
            debug!(order_id, "Inventory already decremented");
        }
        for item in &outcome.adjusted {
            debug!(
                order_id,
                product_id = %item.product_id,
                remaining = item.quantity,
                "Decremented inventory"
            );
            if item.is_oversold() {
                warn!(
                    order_id,
                    product_id = %item.product_id,
                    quantity = item.quantity,
                    "Inventory oversold"
                );
            }
        }
        Ok(outcome)
    }

    /// Writes the completed ledger row for an order. Safe to call repeatedly.
    pub async fn record_payment(&self, order_id: &str, payment_ref: &str) -> Result<Payment> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| ReconcileError::OrderNotFound(order_id.to_string()))?;
        self.store
            .upsert_payment(PaymentUpsert::completed(
                &order,
                payment_ref,
                &self.config.payment_method,
            ))
            .await
    }

    /// Marks the ledger rows of a cancelled order's payment `FAILED`. Safe to
    /// call repeatedly.
    pub async fn mark_payments_failed(&self, order_id: &str, payment_ref: &str) -> Result<usize> {
        let rows = self.store.mark_payments_failed(payment_ref).await?;
        debug!(order_id, payment_ref, rows, "Marked payments FAILED");
        Ok(rows)
    }

    /// Re-runs the secondary effect a retry job describes.
    pub async fn run_retry(&self, job: &RetryJob) -> Result<()> {
        match job.kind {
            RetryKind::DecrementInventory => {
                self.decrement_inventory(&job.order_id).await?;
            }
            RetryKind::RecordPayment => {
                self.record_payment(&job.order_id, job_payment_ref(job)?)
                    .await?;
            }
            RetryKind::MarkPaymentsFailed => {
                self.mark_payments_failed(&job.order_id, job_payment_ref(job)?)
                    .await?;
            }
        }
        Ok(())
    }

    fn with_ledger(&self, transition: Transition, payment_ref: &str) -> Transition {
        match self.config.ledger_write {
            LedgerWrite::Atomic => transition.with_ledger(LedgerIntent {
                payment_ref: payment_ref.to_string(),
                method: self.config.payment_method.clone(),
            }),
            LedgerWrite::BestEffort => transition,
        }
    }

    /// Secondary effects of an order entering PAID.
    async fn settle(&self, order: &Order, payment_ref: &str) {
        if let Err(e) = self.decrement_inventory(&order.id).await {
            warn!(order_id = %order.id, error = %e, "Failed to decrement inventory");
            self.defer(RetryKind::DecrementInventory, &order.id, None, &e)
                .await;
        }

        if self.config.ledger_write == LedgerWrite::BestEffort
            && let Err(e) = self.record_payment(&order.id, payment_ref).await
        {
            warn!(order_id = %order.id, error = %e, "Failed to create payment record");
            self.defer(RetryKind::RecordPayment, &order.id, Some(payment_ref), &e)
                .await;
        }
    }

    async fn defer(
        &self,
        kind: RetryKind,
        order_id: &str,
        payment_ref: Option<&str>,
        cause: &ReconcileError,
    ) {
        let job = RetryJob::new(kind, order_id, payment_ref, &cause.to_string());
        match self.retries.enqueue(job).await {
            Ok(true) => info!(order_id, %kind, "Queued secondary effect for retry"),
            Ok(false) => debug!(order_id, %kind, "Retry already queued"),
            Err(e) => error!(
                order_id,
                %kind,
                error = %e,
                "Could not queue retry, order state may drift"
            ),
        }
    }
}

fn job_payment_ref(job: &RetryJob) -> Result<&str> {
    job.payment_ref.as_deref().ok_or_else(|| {
        ReconcileError::ValidationError(format!("Retry job {} has no payment reference", job.id))
    })
}

fn no_match(payment_ref: &str, current: Option<Order>) -> NoOpReason {
    match current {
        Some(order) => {
            info!(order_id = %order.id, status = %order.status, "Payment event already resolved");
            NoOpReason::AlreadyResolved {
                order_id: order.id,
                status: order.status,
            }
        }
        None => {
            info!(payment_ref, "No order found for payment reference");
            NoOpReason::Unmatched {
                payment_ref: payment_ref.to_string(),
            }
        }
    }
}
