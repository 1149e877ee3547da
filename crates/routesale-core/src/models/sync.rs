//! Sync protocol vocabulary shared by the device queue and the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Entity types a client may sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customers,
    Sales,
    /// Child of a sale; only accepted embedded in the parent sale payload
    SaleItems,
    Payments,
    Distributions,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Sales => "sales",
            Self::SaleItems => "sale_items",
            Self::Payments => "payments",
            Self::Distributions => "distributions",
        }
    }

    /// Application rank inside a batch: referenced entities go first.
    #[must_use]
    pub const fn apply_rank(self) -> u8 {
        match self {
            Self::Customers => 0,
            Self::Distributions => 1,
            Self::Sales | Self::SaleItems => 2,
            Self::Payments => 3,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "customers" => Ok(Self::Customers),
            "sales" => Ok(Self::Sales),
            "sale_items" => Ok(Self::SaleItems),
            "payments" => Ok(Self::Payments),
            "distributions" => Ok(Self::Distributions),
            other => Err(Error::validation(format!("unknown entity '{other}'"))),
        }
    }
}

/// Mutation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Insert,
    Update,
    Delete,
}

impl SyncAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(Error::validation(format!("unknown action '{other}'"))),
        }
    }
}

/// Status of a durable dedup record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Processed,
    Failed,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::validation(format!("unknown sync status '{other}'"))),
        }
    }
}

/// Server-side durable marker, one per (business, operation id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperationRecord {
    pub business_id: String,
    pub operation_id: String,
    pub entity: EntityKind,
    pub action: SyncAction,
    /// Entity id as submitted by the client (may be temporary)
    pub entity_id: String,
    /// Id the operation was applied to once temp ids are resolved
    pub resolved_entity_id: Option<String>,
    pub payload: serde_json::Value,
    pub client_timestamp: DateTime<Utc>,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    /// Last status change; a stale `pending` marker is measured from here
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}
