//! Append-only order event log entries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

use super::ids::{OrderEventId, OrderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventType {
    Created,
    Updated,
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
    Confirmed,
    Cancelled,
    Delivered,
    Repriced,
}

impl OrderEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::ItemAdded => "item_added",
            Self::ItemUpdated => "item_updated",
            Self::ItemRemoved => "item_removed",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Delivered => "delivered",
            Self::Repriced => "repriced",
        }
    }
}

impl fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderEventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "item_added" => Ok(Self::ItemAdded),
            "item_updated" => Ok(Self::ItemUpdated),
            "item_removed" => Ok(Self::ItemRemoved),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "delivered" => Ok(Self::Delivered),
            "repriced" => Ok(Self::Repriced),
            other => Err(Error::validation(format!("unknown order event '{other}'"))),
        }
    }
}

/// A recorded order mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub id: OrderEventId,
    pub order_id: OrderId,
    pub business_id: String,
    pub event_type: OrderEventType,
    /// Order version produced by this event
    pub version: i64,
    pub payload: serde_json::Value,
    /// Globally unique when present
    pub idempotency_key: Option<String>,
    pub actor_id: String,
    /// Unix ms
    pub created_at: i64,
}
