use super::money::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Cancelled,
}

impl OrderStatus {
    /// Statuses from which a checkout may still complete.
    pub const OPEN: &'static [OrderStatus] = &[OrderStatus::Pending, OrderStatus::Processing];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Paid => "PAID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order aggregate as persisted by the store.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    /// Provider checkout-session identifier, stamped when the session is created.
    pub session_ref: Option<String>,
    /// Provider payment-intent identifier, unset until the checkout completes.
    #[serde(default)]
    pub payment_ref: Option<String>,
    pub total: Money,
    /// Set in the same atomic unit as the inventory decrement for this order.
    #[serde(default)]
    pub inventory_committed: bool,
    #[serde(default = "SystemTime::now")]
    pub created_at: SystemTime,
    #[serde(default = "SystemTime::now")]
    pub updated_at: SystemTime,
}

impl Order {
    pub fn new(id: &str, user_id: &str, session_ref: Option<&str>, total: Money) -> Self {
        let now = SystemTime::now();
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            status: OrderStatus::Pending,
            session_ref: session_ref.map(str::to_string),
            payment_ref: None,
            total,
            inventory_committed: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a transition whose predicate has already been checked.
    pub fn apply(&mut self, transition: &Transition, now: SystemTime) {
        self.status = transition.to;
        if let Some(payment_ref) = &transition.stamp_payment_ref {
            self.payment_ref = Some(payment_ref.clone());
        }
        self.updated_at = now;
    }
}

/// A line item. Immutable once the order exists.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: String,
    pub quantity: u32,
}

/// Identity part of a transition predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderSelector {
    /// `id = order_id AND session_ref = session_ref`
    Checkout { order_id: String, session_ref: String },
    /// `payment_ref = payment_ref`
    PaymentRef(String),
}

/// Ledger row to be written in the same atomic unit as the transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerIntent {
    pub payment_ref: String,
    pub method: String,
}

/// A conditional status change: identity + expected prior state + target.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub selector: OrderSelector,
    pub from: &'static [OrderStatus],
    pub to: OrderStatus,
    pub stamp_payment_ref: Option<String>,
    pub ledger: Option<LedgerIntent>,
}

impl Transition {
    pub fn checkout_completed(order_id: &str, session_ref: &str, payment_ref: &str) -> Self {
        Self {
            selector: OrderSelector::Checkout {
                order_id: order_id.to_string(),
                session_ref: session_ref.to_string(),
            },
            from: OrderStatus::OPEN,
            to: OrderStatus::Paid,
            stamp_payment_ref: Some(payment_ref.to_string()),
            ledger: None,
        }
    }

    pub fn payment_succeeded(payment_ref: &str) -> Self {
        Self {
            selector: OrderSelector::PaymentRef(payment_ref.to_string()),
            from: &[OrderStatus::Pending],
            to: OrderStatus::Paid,
            stamp_payment_ref: None,
            ledger: None,
        }
    }

    pub fn payment_failed(payment_ref: &str) -> Self {
        Self {
            selector: OrderSelector::PaymentRef(payment_ref.to_string()),
            from: OrderStatus::OPEN,
            to: OrderStatus::Cancelled,
            stamp_payment_ref: None,
            ledger: None,
        }
    }

    pub fn with_ledger(mut self, intent: LedgerIntent) -> Self {
        self.ledger = Some(intent);
        self
    }

    /// Orders the store should report back as the current row.
    ///
    /// For a checkout this is the order with the given id regardless of its
    /// session, so the caller can tell "absent" from "wrong session".
    pub fn selects(&self, order: &Order) -> bool {
        match &self.selector {
            OrderSelector::Checkout { order_id, .. } => order.id == *order_id,
            OrderSelector::PaymentRef(payment_ref) => {
                order.payment_ref.as_deref() == Some(payment_ref.as_str())
            }
        }
    }

    /// Chooses the row this transition targets among `candidates`.
    ///
    /// Rows satisfying the full predicate win over rows that only share the
    /// identity; ties go to the lowest order id. Store adapters must pick
    /// through here so they agree when a payment reference is shared.
    pub fn pick<'a>(&self, candidates: impl IntoIterator<Item = &'a Order>) -> Option<&'a Order> {
        candidates
            .into_iter()
            .filter(|order| self.selects(order))
            .min_by(|a, b| {
                self.matches(b)
                    .cmp(&self.matches(a))
                    .then_with(|| a.id.cmp(&b.id))
            })
    }

    /// The full predicate: identity and expected prior state.
    pub fn matches(&self, order: &Order) -> bool {
        let identity = match &self.selector {
            OrderSelector::Checkout {
                order_id,
                session_ref,
            } => {
                order.id == *order_id && order.session_ref.as_deref() == Some(session_ref.as_str())
            }
            OrderSelector::PaymentRef(_) => self.selects(order),
        };
        identity && self.from.contains(&order.status)
    }
}

/// Result of a conditional transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub applied: bool,
    /// The selected row after the attempt, if any row was selected.
    pub current: Option<Order>,
}
