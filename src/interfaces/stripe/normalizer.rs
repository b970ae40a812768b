//! Maps Stripe webhook payloads onto canonical [`PaymentEvent`]s.
//!
//! Pure functions only: the caller has already verified the signature and
//! nothing here touches the store.

use crate::domain::event::{Normalized, PaymentEvent};
use crate::domain::money::{Currency, Money};
use crate::error::{ReconcileError, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const PAYMENT_INTENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_INTENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_FAILED: &str = "charge.failed";

/// Metadata key the checkout flow stores the order id under.
const ORDER_ID_METADATA_KEY: &str = "orderId";

/// A verified webhook delivery: `{"id", "type", "data": {"object": {...}}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderEnvelope {
    pub id: Option<String>,
    pub event_type: String,
    pub object: serde_json::Value,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    data: RawData,
}

#[derive(Deserialize)]
struct RawData {
    object: serde_json::Value,
}

impl ProviderEnvelope {
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let envelope: RawEnvelope = serde_json::from_slice(raw)
            .map_err(|e| ReconcileError::Malformed(format!("Undecodable envelope: {e}")))?;
        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            object: envelope.data.object,
        })
    }

    pub fn normalize(self) -> Result<Normalized> {
        normalize(&self.event_type, self.object)
    }
}

/// A field Stripe returns either as a bare id or as an expanded object.
#[derive(Deserialize)]
#[serde(untagged)]
enum Expandable {
    Id(String),
    Object { id: String },
}

impl Expandable {
    fn into_id(self) -> String {
        match self {
            Expandable::Id(id) | Expandable::Object { id } => id,
        }
    }
}

#[derive(Deserialize)]
struct CheckoutSession {
    id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    payment_intent: Option<Expandable>,
    amount_total: Option<i64>,
    currency: Option<String>,
}

#[derive(Deserialize)]
struct PaymentIntent {
    id: Option<String>,
}

#[derive(Deserialize)]
struct Charge {
    payment_intent: Option<Expandable>,
}

fn decode<T: DeserializeOwned>(event_type: &str, object: serde_json::Value) -> Result<T> {
    serde_json::from_value(object)
        .map_err(|e| ReconcileError::Malformed(format!("Error parsing {event_type}: {e}")))
}

fn required(value: Option<String>, field: &str, event_type: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ReconcileError::Malformed(format!(
            "{field} not found in {event_type} payload"
        ))),
    }
}

/// Converts one provider object into a canonical event, or `Skip` for types
/// this service does not handle.
pub fn normalize(event_type: &str, object: serde_json::Value) -> Result<Normalized> {
    let event = match event_type {
        CHECKOUT_SESSION_COMPLETED => {
            let session: CheckoutSession = decode(event_type, object)?;
            let order_id = required(
                session.metadata.get(ORDER_ID_METADATA_KEY).cloned(),
                "orderId",
                event_type,
            )?;
            let session_id = required(session.id, "session id", event_type)?;
            let payment_ref = required(
                session.payment_intent.map(Expandable::into_id),
                "payment_intent",
                event_type,
            )?;
            let amount = match (session.amount_total, session.currency) {
                (Some(units), Some(code)) => Some(Money::from_minor_units(
                    units,
                    Currency::new(&code)
                        .map_err(|e| ReconcileError::Malformed(e.to_string()))?,
                )),
                _ => None,
            };
            PaymentEvent::CheckoutCompleted {
                order_id,
                session_id,
                payment_ref,
                amount,
            }
        }
        PAYMENT_INTENT_SUCCEEDED => {
            let intent: PaymentIntent = decode(event_type, object)?;
            PaymentEvent::PaymentSucceeded {
                payment_ref: required(intent.id, "payment intent id", event_type)?,
            }
        }
        PAYMENT_INTENT_FAILED => {
            let intent: PaymentIntent = decode(event_type, object)?;
            PaymentEvent::PaymentFailed {
                payment_ref: required(intent.id, "payment intent id", event_type)?,
            }
        }
        CHARGE_FAILED => {
            let charge: Charge = decode(event_type, object)?;
            PaymentEvent::PaymentFailed {
                payment_ref: required(
                    charge.payment_intent.map(Expandable::into_id),
                    "payment_intent",
                    event_type,
                )?,
            }
        }
        other => {
            return Ok(Normalized::Skip {
                event_type: other.to_string(),
            });
        }
    };
    Ok(Normalized::Event(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_checkout_session_completed() {
        let object = json!({
            "id": "cs_1",
            "metadata": {"orderId": "o-1", "userId": "u-1"},
            "payment_intent": "pi_1",
            "amount_total": 23000,
            "currency": "zar"
        });

        let normalized = normalize(CHECKOUT_SESSION_COMPLETED, object).unwrap();
        let Normalized::Event(PaymentEvent::CheckoutCompleted {
            order_id,
            session_id,
            payment_ref,
            amount,
        }) = normalized
        else {
            panic!("expected CheckoutCompleted");
        };
        assert_eq!(order_id, "o-1");
        assert_eq!(session_id, "cs_1");
        assert_eq!(payment_ref, "pi_1");
        assert_eq!(amount.unwrap().amount, dec!(230.00));
    }

    #[test]
    fn test_expanded_payment_intent() {
        let object = json!({
            "id": "cs_1",
            "metadata": {"orderId": "o-1"},
            "payment_intent": {"id": "pi_7", "status": "succeeded"}
        });
        let normalized = normalize(CHECKOUT_SESSION_COMPLETED, object).unwrap();
        assert!(matches!(
            normalized,
            Normalized::Event(PaymentEvent::CheckoutCompleted { ref payment_ref, amount: None, .. })
                if payment_ref == "pi_7"
        ));
    }

    #[test]
    fn test_missing_order_id_is_malformed() {
        let object = json!({"id": "cs_1", "metadata": {}, "payment_intent": "pi_1"});
        assert!(matches!(
            normalize(CHECKOUT_SESSION_COMPLETED, object),
            Err(ReconcileError::Malformed(_))
        ));

        let blank = json!({"id": "cs_1", "metadata": {"orderId": "  "}, "payment_intent": "pi_1"});
        assert!(normalize(CHECKOUT_SESSION_COMPLETED, blank).is_err());
    }

    #[test]
    fn test_charge_failed_uses_payment_intent() {
        let object = json!({"id": "ch_1", "payment_intent": "pi_3"});
        assert_eq!(
            normalize(CHARGE_FAILED, object).unwrap(),
            Normalized::Event(PaymentEvent::PaymentFailed {
                payment_ref: "pi_3".into()
            })
        );

        let orphan = json!({"id": "ch_2", "payment_intent": null});
        assert!(matches!(
            normalize(CHARGE_FAILED, orphan),
            Err(ReconcileError::Malformed(_))
        ));
    }

    #[test]
    fn test_payment_intent_events() {
        assert_eq!(
            normalize(PAYMENT_INTENT_SUCCEEDED, json!({"id": "pi_1"})).unwrap(),
            Normalized::Event(PaymentEvent::PaymentSucceeded {
                payment_ref: "pi_1".into()
            })
        );
        assert_eq!(
            normalize(PAYMENT_INTENT_FAILED, json!({"id": "pi_1"})).unwrap(),
            Normalized::Event(PaymentEvent::PaymentFailed {
                payment_ref: "pi_1".into()
            })
        );
    }

    #[test]
    fn test_unrecognized_type_skips_without_decoding() {
        let normalized = normalize("customer.created", json!("not even an object")).unwrap();
        assert_eq!(
            normalized,
            Normalized::Skip {
                event_type: "customer.created".into()
            }
        );
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        assert!(matches!(
            normalize(PAYMENT_INTENT_SUCCEEDED, json!({"id": 42})),
            Err(ReconcileError::Malformed(_))
        ));
    }

    #[test]
    fn test_envelope_parse() {
        let raw = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#;
        let envelope = ProviderEnvelope::parse(raw).unwrap();
        assert_eq!(envelope.id.as_deref(), Some("evt_1"));
        assert_eq!(envelope.event_type, PAYMENT_INTENT_SUCCEEDED);

        assert!(matches!(
            ProviderEnvelope::parse(b"{\"type\":\"charge.failed\"}"),
            Err(ReconcileError::Malformed(_))
        ));
        assert!(ProviderEnvelope::parse(b"not json").is_err());
    }
}
