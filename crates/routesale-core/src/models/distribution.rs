//! Stock distribution model (goods handed to a seller for a route)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::DistributionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub id: DistributionId,
    pub business_id: String,
    pub seller_id: String,
    pub variant_id: String,
    pub quantity: i64,
    pub distribution_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}
