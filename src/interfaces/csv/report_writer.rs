use crate::domain::inventory::InventoryItem;
use crate::domain::money::Currency;
use crate::domain::order::Order;
use crate::domain::payment::Payment;
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct OrderRow<'a> {
    order: &'a str,
    status: &'static str,
    payment_ref: &'a str,
    total: String,
    currency: &'a str,
    inventory_committed: bool,
}

#[derive(Serialize)]
struct InventoryRow<'a> {
    product: &'a str,
    quantity: i64,
    reserved: i64,
}

#[derive(Serialize)]
struct PaymentRow<'a> {
    order: &'a str,
    payment_ref: &'a str,
    status: &'static str,
    amount: String,
    currency: &'a str,
    method: &'a str,
}

/// Renders an amount with the currency's minor-unit scale (`230` → `230.00`).
fn format_amount(amount: Decimal, currency: &Currency) -> String {
    let mut scaled = amount;
    scaled.rescale(currency.minor_unit_exponent());
    scaled.to_string()
}

/// Writes reconciliation state as CSV, one table per call.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        if orders.is_empty() {
            self.writer.write_record([
                "order",
                "status",
                "payment_ref",
                "total",
                "currency",
                "inventory_committed",
            ])?;
        }
        for order in orders {
            self.writer.serialize(OrderRow {
                order: &order.id,
                status: order.status.as_str(),
                payment_ref: order.payment_ref.as_deref().unwrap_or(""),
                total: format_amount(order.total.amount, &order.total.currency),
                currency: order.total.currency.code(),
                inventory_committed: order.inventory_committed,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_inventory(&mut self, items: &[InventoryItem]) -> Result<()> {
        if items.is_empty() {
            self.writer.write_record(["product", "quantity", "reserved"])?;
        }
        for item in items {
            self.writer.serialize(InventoryRow {
                product: &item.product_id,
                quantity: item.quantity,
                reserved: item.reserved,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn write_payments(&mut self, payments: &[Payment]) -> Result<()> {
        if payments.is_empty() {
            self.writer.write_record([
                "order",
                "payment_ref",
                "status",
                "amount",
                "currency",
                "method",
            ])?;
        }
        for payment in payments {
            self.writer.serialize(PaymentRow {
                order: &payment.order_id,
                payment_ref: &payment.payment_ref,
                status: payment.status.as_str(),
                amount: format_amount(payment.amount, &payment.currency),
                currency: payment.currency.code(),
                method: &payment.method,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| crate::error::ReconcileError::IoError(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::order::OrderStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn test_orders_report() {
        let mut order = Order::new(
            "o-1",
            "u-1",
            Some("cs_1"),
            Money::new(dec!(230), Currency::new("ZAR").unwrap()),
        );
        order.status = OrderStatus::Paid;
        order.payment_ref = Some("pi_1".into());

        let mut writer = ReportWriter::new(Vec::new());
        writer.write_orders(&[order]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        assert!(out.starts_with("order,status,payment_ref,total,currency,inventory_committed\n"));
        assert!(out.contains("o-1,PAID,pi_1,230.00,ZAR,false"));
    }

    #[test]
    fn test_inventory_report_allows_negative_stock() {
        let mut writer = ReportWriter::new(Vec::new());
        writer
            .write_inventory(&[InventoryItem::new("p-1", -2, 0)])
            .unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "product,quantity,reserved\np-1,-2,0\n");
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let mut writer = ReportWriter::new(Vec::new());
        writer.write_payments(&[]).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(out, "order,payment_ref,status,amount,currency,method\n");
    }
}
