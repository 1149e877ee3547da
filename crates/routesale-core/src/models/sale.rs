//! Sale model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::ids::{CustomerId, OrderId, SaleId};

/// One line of a sale. Amounts are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

impl SaleItem {
    /// Build a line, computing `subtotal = quantity × unit_price`.
    pub fn new(variant_id: impl Into<String>, quantity: i64, unit_price: i64) -> Result<Self> {
        let variant_id = variant_id.into();
        if variant_id.trim().is_empty() {
            return Err(Error::validation("sale item requires a variant reference"));
        }
        if quantity < 0 {
            return Err(Error::validation("sale item quantity must not be negative"));
        }
        if unit_price < 0 {
            return Err(Error::validation("sale item unit price must not be negative"));
        }
        let subtotal = quantity
            .checked_mul(unit_price)
            .ok_or_else(|| Error::validation("sale item subtotal overflows"))?;
        Ok(Self {
            variant_id,
            quantity,
            unit_price,
            subtotal,
        })
    }
}

/// A completed sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: SaleId,
    pub business_id: String,
    pub customer_id: CustomerId,
    pub seller_id: String,
    /// Order this sale was derived from, when delivered through the lifecycle
    pub order_id: Option<OrderId>,
    pub sale_date: NaiveDate,
    pub total_amount: i64,
    pub amount_paid: i64,
    pub balance_due: i64,
    pub items: Vec<SaleItem>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    pub is_deleted: bool,
}

impl Sale {
    /// Sum of line subtotals.
    pub fn total_of(items: &[SaleItem]) -> Result<i64> {
        items.iter().try_fold(0_i64, |total, item| {
            total
                .checked_add(item.subtotal)
                .ok_or_else(|| Error::validation("sale total overflows"))
        })
    }

    /// Apply a payment amount against the total, deriving the balance due.
    pub fn settle(&mut self, amount_paid: i64) -> Result<()> {
        if amount_paid < 0 {
            return Err(Error::validation("amount paid must not be negative"));
        }
        if amount_paid > self.total_amount {
            return Err(Error::validation("amount paid exceeds sale total"));
        }
        self.amount_paid = amount_paid;
        self.balance_due = self.total_amount - amount_paid;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtotal_is_quantity_times_price() {
        let item = SaleItem::new("v-1", 8, 6).unwrap();
        assert_eq!(item.subtotal, 48);
    }

    #[test]
    fn rejects_negative_lines() {
        assert!(SaleItem::new("v-1", -1, 6).is_err());
        assert!(SaleItem::new("v-1", 1, -6).is_err());
        assert!(SaleItem::new(" ", 1, 6).is_err());
    }

    #[test]
    fn overflow_is_a_validation_error() {
        let error = SaleItem::new("v-1", i64::MAX, 2).unwrap_err();
        assert_eq!(error.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn total_sums_subtotals() {
        let items = vec![
            SaleItem::new("a", 2, 10).unwrap(),
            SaleItem::new("b", 1, 5).unwrap(),
        ];
        assert_eq!(Sale::total_of(&items).unwrap(), 25);
    }
}
