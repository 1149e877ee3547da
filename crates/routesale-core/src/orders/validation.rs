//! Input checks shared by order mutations. All of them run before any write.

use chrono::NaiveDate;

use crate::error::{Error, Result};
use crate::models::OrderItem;

use super::commands::{DeliveredItem, NewOrderItem};

/// Orders are always scheduled for a future day.
pub fn delivery_date(date: NaiveDate, today: NaiveDate) -> Result<()> {
    if date <= today {
        return Err(Error::validation(format!(
            "delivery date {date} must be after {today}"
        )));
    }
    Ok(())
}

pub fn quantity(quantity: i64) -> Result<()> {
    if quantity <= 0 {
        return Err(Error::validation(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

pub fn price(price: i64, field: &str) -> Result<()> {
    if price < 0 {
        return Err(Error::validation(format!(
            "{field} must not be negative, got {price}"
        )));
    }
    Ok(())
}

/// Validate one supplied line and build it.
pub fn item(item: &NewOrderItem) -> Result<OrderItem> {
    let variant_id = item.variant_id.trim();
    if variant_id.is_empty() {
        return Err(Error::validation("order item requires a variant reference"));
    }
    quantity(item.quantity)?;
    price(item.unit_price, "unit price")?;
    Ok(OrderItem::new(variant_id, item.quantity, item.unit_price))
}

/// Validate a full item set. An order always has at least one line.
pub fn items(items: &[NewOrderItem]) -> Result<Vec<OrderItem>> {
    if items.is_empty() {
        return Err(Error::validation("an order needs at least one item"));
    }
    items.iter().map(item).collect()
}

pub fn delivered_item(item: &DeliveredItem) -> Result<()> {
    if let Some(delivered) = item.delivered_quantity {
        if delivered < 0 {
            return Err(Error::validation(format!(
                "delivered quantity must not be negative, got {delivered}"
            )));
        }
    }
    if let Some(final_price) = item.final_unit_price {
        price(final_price, "final unit price")?;
    }
    Ok(())
}
