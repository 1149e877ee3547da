//! Payment model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

use super::ids::{CustomerId, PaymentId, SaleId};

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Transfer,
    Card,
    Other,
}

impl PaymentMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Transfer => "transfer",
            Self::Card => "card",
            Self::Other => "other",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cash" => Ok(Self::Cash),
            "transfer" => Ok(Self::Transfer),
            "card" => Ok(Self::Card),
            "other" => Ok(Self::Other),
            other => Err(Error::validation(format!("unknown payment method '{other}'"))),
        }
    }
}

/// A payment applied to a sale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub business_id: String,
    pub sale_id: SaleId,
    pub customer_id: Option<CustomerId>,
    /// Amount in minor units
    pub amount: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    /// When the money changed hands (Unix ms)
    pub paid_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_deleted: bool,
}
