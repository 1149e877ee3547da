//! Order aggregate: header, lines, lifecycle status and snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::ids::{CustomerId, OrderId, OrderItemId, SaleId};

/// Lifecycle status of an order.
///
/// Legal transitions: draft → confirmed → delivered, draft → cancelled,
/// confirmed → cancelled. Delivered and cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Draft,
    Confirmed,
    Cancelled,
    Delivered,
}

impl OrderStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Delivered => "delivered",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Delivered)
    }

    /// Header and lines may still change.
    #[must_use]
    pub const fn is_editable(self) -> bool {
        matches!(self, Self::Draft | Self::Confirmed)
    }

    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Confirmed | Self::Cancelled)
                | (Self::Confirmed, Self::Delivered | Self::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "delivered" => Ok(Self::Delivered),
            other => Err(Error::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// How the customer intends to pay on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentIntent {
    /// Paid in full at delivery
    #[default]
    Immediate,
    /// Delivered on credit, full balance due
    Credit,
}

impl PaymentIntent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Credit => "credit",
        }
    }
}

impl FromStr for PaymentIntent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "credit" => Ok(Self::Credit),
            other => Err(Error::validation(format!(
                "unknown payment intent '{other}'"
            ))),
        }
    }
}

/// One line of an order. Prices are integer minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: OrderItemId,
    pub variant_id: String,
    pub quantity: i64,
    /// Actual quantity handed over; `None` until delivery
    pub delivered_quantity: Option<i64>,
    /// Price quoted when the line was taken
    pub unit_price: i64,
    /// Override applied at delivery or by repricing
    pub final_unit_price: Option<i64>,
    pub is_modified: bool,
    /// Quantity before the first modification; never overwritten afterwards
    pub original_quantity: Option<i64>,
}

impl OrderItem {
    #[must_use]
    pub fn new(variant_id: impl Into<String>, quantity: i64, unit_price: i64) -> Self {
        Self {
            id: OrderItemId::new(),
            variant_id: variant_id.into(),
            quantity,
            delivered_quantity: None,
            unit_price,
            final_unit_price: None,
            is_modified: false,
            original_quantity: None,
        }
    }

    #[must_use]
    pub fn effective_unit_price(&self) -> i64 {
        self.final_unit_price.unwrap_or(self.unit_price)
    }

    pub fn line_total(&self) -> Result<i64> {
        let quantity = self.delivered_quantity.unwrap_or(self.quantity);
        quantity
            .checked_mul(self.effective_unit_price())
            .ok_or_else(|| Error::validation("order line total overflows"))
    }

    /// Change the ordered quantity, keeping the first pre-edit baseline.
    pub fn set_quantity(&mut self, quantity: i64) {
        if self.original_quantity.is_none() {
            self.original_quantity = Some(self.quantity);
        }
        self.quantity = quantity;
        self.is_modified = true;
    }
}

/// Immutable copy of an order captured at a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSnapshot {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub version: i64,
    pub customer_id: CustomerId,
    pub seller_id: String,
    pub delivery_date: NaiveDate,
    pub payment_intent: PaymentIntent,
    pub total_amount: i64,
    pub notes: Option<String>,
    pub items: Vec<OrderItem>,
    /// Capture timestamp (Unix ms)
    pub captured_at: i64,
}

/// Order aggregate root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub business_id: String,
    pub customer_id: CustomerId,
    pub seller_id: String,
    pub delivery_date: NaiveDate,
    pub status: OrderStatus,
    pub payment_intent: PaymentIntent,
    pub total_amount: i64,
    pub notes: Option<String>,
    /// Starts at 1, incremented by exactly one per accepted mutation
    pub version: i64,
    pub confirmed_snapshot: Option<OrderSnapshot>,
    pub delivered_snapshot: Option<OrderSnapshot>,
    /// Sale derived at delivery
    pub sale_id: Option<SaleId>,
    pub created_by: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Recompute the total from the current lines.
    pub fn recalculate_total(&mut self) -> Result<()> {
        self.total_amount = self.items.iter().try_fold(0_i64, |total, item| {
            total
                .checked_add(item.line_total()?)
                .ok_or_else(|| Error::validation("order total overflows"))
        })?;
        Ok(())
    }

    #[must_use]
    pub fn snapshot(&self, captured_at: i64) -> OrderSnapshot {
        OrderSnapshot {
            order_id: self.id,
            status: self.status,
            version: self.version,
            customer_id: self.customer_id,
            seller_id: self.seller_id.clone(),
            delivery_date: self.delivery_date,
            payment_intent: self.payment_intent,
            total_amount: self.total_amount,
            notes: self.notes.clone(),
            items: self.items.clone(),
            captured_at,
        }
    }

    pub fn item_mut(&mut self, item_id: OrderItemId) -> Result<&mut OrderItem> {
        let order_id = self.id;
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| Error::not_found(format!("item {item_id} on order {order_id}")))
    }

    /// Fails with a validation error unless the order may be edited.
    pub fn ensure_editable(&self, action: &str) -> Result<()> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "cannot {action} order {} in status {}",
                self.id, self.status
            )))
        }
    }

    /// Move to `next`, rejecting transitions outside the lifecycle graph.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::validation(format!(
                "order {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}
