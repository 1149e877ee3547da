//! Request shapes accepted by the order lifecycle manager.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{CustomerId, Order, OrderItemId, PaymentIntent, Sale};

/// A line supplied on create, update or add-item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewOrderItem {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateOrder {
    pub customer_id: CustomerId,
    /// Defaults to the calling user
    #[serde(default)]
    pub seller_id: Option<String>,
    pub delivery_date: NaiveDate,
    #[serde(default)]
    pub payment_intent: PaymentIntent,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub client_event_id: Option<String>,
}

/// Partial header update. `items`, when present, replaces the whole item set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OrderPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seller_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntent>,
    /// Empty string clears the notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<NewOrderItem>>,
}

impl OrderPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// What was actually handed over for one line.
///
/// Omitted values fall back to the ordered quantity and quoted price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeliveredItem {
    pub item_id: OrderItemId,
    #[serde(default)]
    pub delivered_quantity: Option<i64>,
    #[serde(default)]
    pub final_unit_price: Option<i64>,
}

/// Optimistic concurrency guard carried by every mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionGuard {
    /// Version the caller believes is current
    pub base_version: i64,
    /// Idempotency key recorded on the resulting event
    #[serde(default)]
    pub client_event_id: Option<String>,
}

impl VersionGuard {
    #[must_use]
    pub const fn at(base_version: i64) -> Self {
        Self {
            base_version,
            client_event_id: None,
        }
    }

    #[must_use]
    pub fn with_event_id(mut self, key: impl Into<String>) -> Self {
        self.client_event_id = Some(key.into());
        self
    }
}

/// Result of a delivery: the delivered order and the sale derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub order: Order,
    pub sale: Sale,
}
