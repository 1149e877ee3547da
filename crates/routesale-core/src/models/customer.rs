//! Customer model

use serde::{Deserialize, Serialize};

use super::ids::CustomerId;

/// A customer on a seller's route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: CustomerId,
    pub business_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: i64,
    /// Soft delete flag for sync
    pub is_deleted: bool,
}

impl Customer {
    /// Create a customer stamped at `now_ms`
    #[must_use]
    pub fn new(
        id: CustomerId,
        business_id: impl Into<String>,
        name: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            id,
            business_id: business_id.into(),
            name: name.into(),
            phone: None,
            address: None,
            notes: None,
            created_at: now_ms,
            updated_at: now_ms,
            is_deleted: false,
        }
    }
}
