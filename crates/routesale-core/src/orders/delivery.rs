//! Delivery arithmetic: recording what was handed over and deriving the sale.

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::{Order, PaymentIntent, Sale, SaleId, SaleItem};

use super::commands::DeliveredItem;
use super::validation;

/// Record delivered quantities and price overrides on the order lines.
///
/// Lines not mentioned are delivered at their ordered quantity.
pub fn record_delivered(order: &mut Order, delivered: &[DeliveredItem]) -> Result<()> {
    for entry in delivered {
        validation::delivered_item(entry)?;
        let item = order.item_mut(entry.item_id)?;
        item.delivered_quantity = Some(entry.delivered_quantity.unwrap_or(item.quantity));
        if let Some(final_price) = entry.final_unit_price {
            item.final_unit_price = Some(final_price);
        }
    }
    for item in &mut order.items {
        if item.delivered_quantity.is_none() {
            item.delivered_quantity = Some(item.quantity);
        }
    }
    order.recalculate_total()
}

/// Build the sale for a delivered order.
pub fn derive_sale(order: &Order, sale_date: NaiveDate, now_ms: i64) -> Result<Sale> {
    let items = order
        .items
        .iter()
        .map(|item| {
            SaleItem::new(
                item.variant_id.as_str(),
                item.delivered_quantity.unwrap_or(item.quantity),
                item.effective_unit_price(),
            )
        })
        .collect::<Result<Vec<_>>>()?;
    let total_amount = Sale::total_of(&items)?;

    let mut sale = Sale {
        id: SaleId::new(),
        business_id: order.business_id.clone(),
        customer_id: order.customer_id,
        seller_id: order.seller_id.clone(),
        order_id: Some(order.id),
        sale_date,
        total_amount,
        amount_paid: 0,
        balance_due: total_amount,
        items,
        created_at: now_ms,
        is_deleted: false,
    };
    let paid = match order.payment_intent {
        PaymentIntent::Immediate => total_amount,
        PaymentIntent::Credit => 0,
    };
    sale.settle(paid)?;
    Ok(sale)
}

/// Deliveries happen on the scheduled day only.
pub fn ensure_delivery_day(order: &Order, today: NaiveDate) -> Result<()> {
    if order.delivery_date != today {
        return Err(Error::validation(format!(
            "order {} is scheduled for {}, not {today}",
            order.id, order.delivery_date
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerId, OrderId, OrderItem, OrderStatus};

    fn order(intent: PaymentIntent, items: Vec<OrderItem>) -> Order {
        Order {
            id: OrderId::new(),
            business_id: "biz-1".to_string(),
            customer_id: CustomerId::new(),
            seller_id: "seller-1".to_string(),
            delivery_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            status: OrderStatus::Confirmed,
            payment_intent: intent,
            total_amount: 0,
            notes: None,
            version: 2,
            confirmed_snapshot: None,
            delivered_snapshot: None,
            sale_id: None,
            created_by: "seller-1".to_string(),
            created_at: 0,
            updated_at: 0,
            items,
        }
    }

    #[test]
    fn delivered_values_drive_the_sale() {
        let line = OrderItem::new("v-1", 10, 5);
        let mut order = order(PaymentIntent::Credit, vec![line.clone()]);
        record_delivered(
            &mut order,
            &[DeliveredItem {
                item_id: line.id,
                delivered_quantity: Some(8),
                final_unit_price: Some(6),
            }],
        )
        .unwrap();

        let sale = derive_sale(&order, order.delivery_date, 0).unwrap();
        assert_eq!(sale.items[0].subtotal, 48);
        assert_eq!(sale.total_amount, 48);
        assert_eq!((sale.amount_paid, sale.balance_due), (0, 48));
        assert_eq!(order.total_amount, 48);
    }

    #[test]
    fn unmentioned_lines_deliver_in_full_and_immediate_pays() {
        let mut order = order(
            PaymentIntent::Immediate,
            vec![OrderItem::new("v-1", 3, 10), OrderItem::new("v-2", 1, 7)],
        );
        record_delivered(&mut order, &[]).unwrap();
        let sale = derive_sale(&order, order.delivery_date, 0).unwrap();
        assert_eq!(sale.total_amount, 37);
        assert_eq!((sale.amount_paid, sale.balance_due), (37, 0));
    }

    #[test]
    fn unknown_line_is_not_found() {
        let mut order = order(PaymentIntent::Immediate, vec![OrderItem::new("v-1", 1, 1)]);
        let error = record_delivered(
            &mut order,
            &[DeliveredItem {
                item_id: crate::models::OrderItemId::new(),
                delivered_quantity: None,
                final_unit_price: None,
            }],
        )
        .unwrap_err();
        assert_eq!(error.code(), "NOT_FOUND");
    }
}
