use crate::domain::inventory::InventoryItem;
use crate::domain::money::{Currency, Money};
use crate::domain::order::{Order, OrderItem, OrderStatus};
use crate::domain::ports::OrderStore;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::time::SystemTime;
use tracing::{debug, info};

/// Orders and stock as left behind by the upstream checkout flow.
#[derive(Debug, Deserialize, Default)]
pub struct SeedSnapshot {
    #[serde(default)]
    pub orders: Vec<SeedOrder>,
    #[serde(default)]
    pub inventory: Vec<SeedStock>,
}

#[derive(Debug, Deserialize)]
pub struct SeedOrder {
    pub id: String,
    pub user_id: String,
    #[serde(default = "pending")]
    pub status: OrderStatus,
    pub session_ref: Option<String>,
    #[serde(default)]
    pub payment_ref: Option<String>,
    pub total: Decimal,
    /// Falls back to the configured default currency.
    pub currency: Option<Currency>,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Deserialize)]
pub struct SeedItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SeedStock {
    pub product_id: String,
    pub quantity: i64,
    #[serde(default)]
    pub reserved: i64,
}

fn pending() -> OrderStatus {
    OrderStatus::Pending
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SeedStats {
    pub orders_created: usize,
    pub stock_created: usize,
    /// Rows already present in the store, left untouched.
    pub skipped: usize,
}

impl SeedSnapshot {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Writes rows that do not exist yet. Existing rows are never overwritten,
    /// so seeding a persistent store twice is harmless.
    pub async fn apply(self, store: &dyn OrderStore, default_currency: &Currency) -> Result<SeedStats> {
        let mut stats = SeedStats::default();

        for seed in self.orders {
            if store.get_order(&seed.id).await?.is_some() {
                debug!(order_id = %seed.id, "Order already present, skipping seed");
                stats.skipped += 1;
                continue;
            }
            let currency = seed.currency.unwrap_or_else(|| default_currency.clone());
            let items = seed
                .items
                .into_iter()
                .map(|item| OrderItem {
                    order_id: seed.id.clone(),
                    product_id: item.product_id,
                    quantity: item.quantity,
                })
                .collect();
            let now = SystemTime::now();
            let order = Order {
                id: seed.id,
                user_id: seed.user_id,
                status: seed.status,
                session_ref: seed.session_ref,
                payment_ref: seed.payment_ref,
                total: Money::new(seed.total, currency),
                inventory_committed: false,
                created_at: now,
                updated_at: now,
            };
            store.create_order(order, items).await?;
            stats.orders_created += 1;
        }

        for seed in self.inventory {
            if store.get_inventory(&seed.product_id).await?.is_some() {
                debug!(product_id = %seed.product_id, "Stock already present, skipping seed");
                stats.skipped += 1;
                continue;
            }
            store
                .stock_inventory(InventoryItem::new(&seed.product_id, seed.quantity, seed.reserved))
                .await?;
            stats.stock_created += 1;
        }

        info!(
            orders = stats.orders_created,
            stock = stats.stock_created,
            skipped = stats.skipped,
            "Store seeded"
        );
        Ok(stats)
    }
}
