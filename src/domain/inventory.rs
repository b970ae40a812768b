use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Stock counters for one product.
///
/// `reserved` never goes below zero. `quantity` is allowed to: an oversold
/// product shows up as negative stock instead of being silently clamped.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InventoryItem {
    pub product_id: String,
    pub quantity: i64,
    pub reserved: i64,
    #[serde(default = "SystemTime::now")]
    pub updated_at: SystemTime,
}

impl InventoryItem {
    pub fn new(product_id: &str, quantity: i64, reserved: i64) -> Self {
        Self {
            product_id: product_id.to_string(),
            quantity,
            reserved,
            updated_at: SystemTime::now(),
        }
    }

    /// Takes `units` out of stock for a paid line item, releasing up to the
    /// same amount from the reservation.
    pub fn decrement(&mut self, units: u32, now: SystemTime) {
        let units = i64::from(units);
        self.quantity -= units;
        self.reserved -= self.reserved.min(units).max(0);
        self.updated_at = now;
    }

    pub fn is_oversold(&self) -> bool {
        self.quantity < 0
    }
}

/// Result of an order-scoped inventory decrement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecrementOutcome {
    /// Rows after adjustment. Empty when nothing was adjusted.
    pub adjusted: Vec<InventoryItem>,
    /// The order's decrement had already been committed earlier.
    pub already_applied: bool,
}
