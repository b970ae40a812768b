use super::money::Money;
use std::fmt;

/// Provider-agnostic payment lifecycle events.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    CheckoutCompleted {
        order_id: String,
        session_id: String,
        payment_ref: String,
        amount: Option<Money>,
    },
    PaymentSucceeded {
        payment_ref: String,
    },
    PaymentFailed {
        payment_ref: String,
    },
}

impl PaymentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PaymentEvent::CheckoutCompleted { .. } => EventKind::CheckoutCompleted,
            PaymentEvent::PaymentSucceeded { .. } => EventKind::PaymentSucceeded,
            PaymentEvent::PaymentFailed { .. } => EventKind::PaymentFailed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentSucceeded,
    PaymentFailed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::CheckoutCompleted => "CheckoutCompleted",
            EventKind::PaymentSucceeded => "PaymentSucceeded",
            EventKind::PaymentFailed => "PaymentFailed",
        };
        f.write_str(name)
    }
}

/// Output of the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(PaymentEvent),
    /// A type tag this service does not handle.
    Skip { event_type: String },
}
