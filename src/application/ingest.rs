use super::engine::{Outcome, ReconciliationEngine};
use crate::domain::event::{EventKind, Normalized};
use crate::error::Result;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The accept/retry signal handed back to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    /// Recognized and processed, including idempotent no-ops.
    Processed { kind: EventKind, outcome: Outcome },
    /// A type this service does not handle.
    Ignored { event_type: String },
    /// The payload can never be processed; do not redeliver.
    Rejected { reason: String },
    /// Transient failure; the provider should redeliver.
    Retry { reason: String },
}

impl Ack {
    pub fn is_success(&self) -> bool {
        matches!(self, Ack::Processed { .. } | Ack::Ignored { .. })
    }

    /// Status code a webhook endpoint would answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Ack::Processed { .. } | Ack::Ignored { .. } => 200,
            Ack::Rejected { .. } => 400,
            Ack::Retry { .. } => 500,
        }
    }
}

/// Routes normalized deliveries into the engine and classifies the result.
#[derive(Clone)]
pub struct Ingestor {
    engine: Arc<ReconciliationEngine>,
}

impl Ingestor {
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self { engine }
    }

    pub async fn handle(&self, normalized: Result<Normalized>) -> Ack {
        let event = match normalized {
            Ok(Normalized::Event(event)) => event,
            Ok(Normalized::Skip { event_type }) => {
                info!(%event_type, "Unhandled event type");
                return Ack::Ignored { event_type };
            }
            Err(e) => {
                warn!(error = %e, "Rejecting undecodable event");
                return Ack::Rejected {
                    reason: e.to_string(),
                };
            }
        };

        let kind = event.kind();
        match self.engine.apply(event).await {
            Ok(outcome) => Ack::Processed { kind, outcome },
            Err(e) if e.is_retryable() => {
                error!(%kind, error = %e, "Error processing event");
                Ack::Retry {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                error!(%kind, error = %e, "Event cannot be processed");
                Ack::Rejected {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::EngineConfig;
    use crate::domain::event::PaymentEvent;
    use crate::error::ReconcileError;
    use crate::domain::inventory::{DecrementOutcome, InventoryItem};
    use crate::domain::order::{Order, OrderItem, Transition, TransitionOutcome};
    use crate::domain::payment::{Payment, PaymentUpsert};
    use crate::domain::ports::OrderStore;
    use crate::infrastructure::in_memory::{InMemoryOrderStore, InMemoryRetryQueue};
    use async_trait::async_trait;

    /// Store whose conditional updates always time out.
    struct Unavailable(InMemoryOrderStore);

    #[async_trait]
    impl OrderStore for Unavailable {
        async fn try_transition(&self, _transition: &Transition) -> Result<TransitionOutcome> {
            Err(ReconcileError::Transient("connection reset".into()))
        }

        async fn decrement_inventory(&self, order_id: &str) -> Result<DecrementOutcome> {
            self.0.decrement_inventory(order_id).await
        }

        async fn upsert_payment(&self, upsert: PaymentUpsert) -> Result<Payment> {
            self.0.upsert_payment(upsert).await
        }

        async fn mark_payments_failed(&self, payment_ref: &str) -> Result<usize> {
            self.0.mark_payments_failed(payment_ref).await
        }

        async fn get_order(&self, order_id: &str) -> Result<Option<Order>> {
            self.0.get_order(order_id).await
        }

        async fn order_items(&self, order_id: &str) -> Result<Vec<OrderItem>> {
            self.0.order_items(order_id).await
        }

        async fn get_inventory(&self, product_id: &str) -> Result<Option<InventoryItem>> {
            self.0.get_inventory(product_id).await
        }

        async fn payments_for_order(&self, order_id: &str) -> Result<Vec<Payment>> {
            self.0.payments_for_order(order_id).await
        }

        async fn all_orders(&self) -> Result<Vec<Order>> {
            self.0.all_orders().await
        }

        async fn all_inventory(&self) -> Result<Vec<InventoryItem>> {
            self.0.all_inventory().await
        }

        async fn all_payments(&self) -> Result<Vec<Payment>> {
            self.0.all_payments().await
        }

        async fn create_order(&self, order: Order, items: Vec<OrderItem>) -> Result<()> {
            self.0.create_order(order, items).await
        }

        async fn stock_inventory(&self, item: InventoryItem) -> Result<()> {
            self.0.stock_inventory(item).await
        }
    }

    fn ingestor() -> Ingestor {
        let engine = ReconciliationEngine::new(
            Arc::new(InMemoryOrderStore::new()),
            Arc::new(InMemoryRetryQueue::new()),
            EngineConfig::default(),
        );
        Ingestor::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn test_skip_is_acknowledged() {
        let ack = ingestor()
            .handle(Ok(Normalized::Skip {
                event_type: "customer.created".into(),
            }))
            .await;
        assert!(ack.is_success());
        assert_eq!(ack.http_status(), 200);
    }

    #[tokio::test]
    async fn test_malformed_is_rejected() {
        let ack = ingestor()
            .handle(Err(ReconcileError::Malformed("orderId missing".into())))
            .await;
        assert!(!ack.is_success());
        assert_eq!(ack.http_status(), 400);
    }

    #[tokio::test]
    async fn test_missing_order_asks_for_retry() {
        let ack = ingestor()
            .handle(Ok(Normalized::Event(PaymentEvent::CheckoutCompleted {
                order_id: "o-404".into(),
                session_id: "cs_1".into(),
                payment_ref: "pi_1".into(),
                amount: None,
            })))
            .await;
        assert!(matches!(ack, Ack::Retry { .. }));
        assert_eq!(ack.http_status(), 500);
    }

    #[tokio::test]
    async fn test_noop_is_success() {
        let ack = ingestor()
            .handle(Ok(Normalized::Event(PaymentEvent::PaymentFailed {
                payment_ref: "pi_unknown".into(),
            })))
            .await;
        assert!(ack.is_success());
        assert!(matches!(
            ack,
            Ack::Processed {
                kind: EventKind::PaymentFailed,
                outcome: Outcome::NoOp(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_transient_store_error_asks_for_retry() {
        let engine = ReconciliationEngine::new(
            Arc::new(Unavailable(InMemoryOrderStore::new())),
            Arc::new(InMemoryRetryQueue::new()),
            EngineConfig::default(),
        );
        let ack = Ingestor::new(Arc::new(engine))
            .handle(Ok(Normalized::Event(PaymentEvent::PaymentSucceeded {
                payment_ref: "pi_1".into(),
            })))
            .await;
        assert_eq!(ack.http_status(), 500);
        let Ack::Retry { reason } = &ack else {
            panic!("expected a retry, got {ack:?}");
        };
        assert!(reason.contains("connection reset"));
    }
}
