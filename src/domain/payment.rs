use super::money::{Currency, Money};
use super::order::Order;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

pub const DEFAULT_PAYMENT_METHOD: &str = "STRIPE_CHECKOUT";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

/// A payment ledger entry.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub id: Uuid,
    pub order_id: String,
    pub user_id: String,
    pub amount: rust_decimal::Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub method: String,
    pub payment_ref: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// Write request for the ledger, keyed by (`order_id`, `payment_ref`).
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentUpsert {
    pub order_id: String,
    pub user_id: String,
    pub payment_ref: String,
    pub status: PaymentStatus,
    pub amount: Money,
    pub method: String,
}

impl PaymentUpsert {
    /// A completed payment for the order's stored total.
    pub fn completed(order: &Order, payment_ref: &str, method: &str) -> Self {
        Self {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            payment_ref: payment_ref.to_string(),
            status: PaymentStatus::Completed,
            amount: order.total.clone(),
            method: method.to_string(),
        }
    }
}

impl Payment {
    pub fn from_upsert(upsert: &PaymentUpsert, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id: upsert.order_id.clone(),
            user_id: upsert.user_id.clone(),
            amount: upsert.amount.amount,
            currency: upsert.amount.currency.clone(),
            status: upsert.status,
            method: upsert.method.clone(),
            payment_ref: upsert.payment_ref.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_keyed_by(&self, order_id: &str, payment_ref: &str) -> bool {
        self.order_id == order_id && self.payment_ref == payment_ref
    }

    /// Re-applies an upsert to an existing row. Returns whether anything changed.
    pub fn merge(&mut self, upsert: &PaymentUpsert, now: SystemTime) -> bool {
        if self.status == upsert.status
            && self.amount == upsert.amount.amount
            && self.currency == upsert.amount.currency
        {
            return false;
        }
        self.status = upsert.status;
        self.amount = upsert.amount.amount;
        self.currency = upsert.amount.currency.clone();
        self.updated_at = now;
        true
    }

    /// Marks the entry failed. Returns `false` if it already was.
    pub fn mark_failed(&mut self, now: SystemTime) -> bool {
        if self.status == PaymentStatus::Failed {
            return false;
        }
        self.status = PaymentStatus::Failed;
        self.updated_at = now;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order::new(
            "o-1",
            "u-1",
            Some("cs_1"),
            Money::new(dec!(230.0), Currency::new("ZAR").unwrap()),
        )
    }

    #[test]
    fn test_completed_upsert_uses_order_total() {
        let upsert = PaymentUpsert::completed(&order(), "pi_1", DEFAULT_PAYMENT_METHOD);
        let payment = Payment::from_upsert(&upsert, SystemTime::now());

        assert_eq!(payment.amount, dec!(230.0));
        assert_eq!(payment.currency.code(), "ZAR");
        assert_eq!(payment.user_id, "u-1");
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert!(payment.is_keyed_by("o-1", "pi_1"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let upsert = PaymentUpsert::completed(&order(), "pi_1", DEFAULT_PAYMENT_METHOD);
        let mut payment = Payment::from_upsert(&upsert, SystemTime::now());
        assert!(!payment.merge(&upsert, SystemTime::now()));
    }

    #[test]
    fn test_mark_failed_once() {
        let upsert = PaymentUpsert::completed(&order(), "pi_1", DEFAULT_PAYMENT_METHOD);
        let mut payment = Payment::from_upsert(&upsert, SystemTime::now());
        assert!(payment.mark_failed(SystemTime::now()));
        assert!(!payment.mark_failed(SystemTime::now()));
        assert_eq!(payment.status, PaymentStatus::Failed);
    }
}
