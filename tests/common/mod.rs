#![allow(dead_code)]

use order_reconciler::application::config::EngineConfig;
use order_reconciler::application::engine::ReconciliationEngine;
use order_reconciler::domain::inventory::InventoryItem;
use order_reconciler::domain::money::{Currency, Money};
use order_reconciler::domain::order::{Order, OrderItem};
use order_reconciler::domain::ports::{OrderStore, OrderStoreRef, RetryQueueRef};
use order_reconciler::infrastructure::in_memory::{InMemoryOrderStore, InMemoryRetryQueue};
use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

pub fn zar(amount: Decimal) -> Money {
    Money::new(amount, Currency::new("ZAR").unwrap())
}

/// Seeds a PENDING order with one line per `(product, quantity)`.
pub async fn seed_order(
    store: &dyn OrderStore,
    id: &str,
    session_ref: Option<&str>,
    payment_ref: Option<&str>,
    total: Decimal,
    lines: &[(&str, u32)],
) {
    let mut order = Order::new(id, &format!("user-{id}"), session_ref, zar(total));
    order.payment_ref = payment_ref.map(str::to_string);
    let items = lines
        .iter()
        .map(|(product_id, quantity)| OrderItem {
            order_id: id.to_string(),
            product_id: product_id.to_string(),
            quantity: *quantity,
        })
        .collect();
    store.create_order(order, items).await.unwrap();
}

pub async fn stock(store: &dyn OrderStore, product_id: &str, quantity: i64, reserved: i64) {
    store
        .stock_inventory(InventoryItem::new(product_id, quantity, reserved))
        .await
        .unwrap();
}

pub fn engine_over(store: OrderStoreRef, retries: RetryQueueRef) -> Arc<ReconciliationEngine> {
    Arc::new(ReconciliationEngine::new(store, retries, EngineConfig::default()))
}

pub fn in_memory() -> (InMemoryOrderStore, InMemoryRetryQueue) {
    (InMemoryOrderStore::new(), InMemoryRetryQueue::new())
}

/// Writes webhook envelopes, one per line, to a temp file.
pub fn events_file(lines: &[String]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

pub fn checkout_event(order_id: &str, session_id: &str, payment_ref: &str) -> String {
    serde_json::json!({
        "id": format!("evt_cs_{order_id}"),
        "type": "checkout.session.completed",
        "data": {"object": {
            "id": session_id,
            "metadata": {"orderId": order_id},
            "payment_intent": payment_ref
        }}
    })
    .to_string()
}

pub fn intent_event(event_type: &str, payment_ref: &str) -> String {
    serde_json::json!({
        "id": format!("evt_{payment_ref}"),
        "type": event_type,
        "data": {"object": {"id": payment_ref}}
    })
    .to_string()
}

pub fn charge_failed_event(payment_ref: &str) -> String {
    serde_json::json!({
        "id": format!("evt_ch_{payment_ref}"),
        "type": "charge.failed",
        "data": {"object": {"id": format!("ch_{payment_ref}"), "payment_intent": payment_ref}}
    })
    .to_string()
}
