//! Typed per-entity payload parsers.
//!
//! Every payload is decoded into a closed struct that rejects unknown and
//! missing fields, then checked for value ranges before anything is written.

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{EntityKind, PaymentMethod, SyncAction};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerFields {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial customer update; an empty string clears an optional field.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CustomerPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaleItemFields {
    pub variant_id: String,
    pub quantity: i64,
    pub unit_price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SaleFields {
    /// Customer id, possibly a temporary id from the same device
    pub customer_id: String,
    /// Defaults to the calling user
    #[serde(default)]
    pub seller_id: Option<String>,
    /// Defaults to the server's current date
    #[serde(default)]
    pub sale_date: Option<NaiveDate>,
    pub items: Vec<SaleItemFields>,
    #[serde(default)]
    pub amount_paid: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentFields {
    pub sale_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub amount: i64,
    #[serde(default)]
    pub method: PaymentMethod,
    #[serde(default)]
    pub reference: Option<String>,
    /// Defaults to the operation's client timestamp
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentPatch {
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub method: Option<PaymentMethod>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DistributionFields {
    #[serde(default)]
    pub seller_id: Option<String>,
    pub variant_id: String,
    pub quantity: i64,
    pub distribution_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DistributionPatch {
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub distribution_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Deletes carry no fields.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Empty {}

/// A fully parsed mutation, one variant per supported (entity, action) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    InsertCustomer(CustomerFields),
    UpdateCustomer(CustomerPatch),
    DeleteCustomer,
    InsertSale(SaleFields),
    DeleteSale,
    InsertPayment(PaymentFields),
    UpdatePayment(PaymentPatch),
    DeletePayment,
    InsertDistribution(DistributionFields),
    UpdateDistribution(DistributionPatch),
    DeleteDistribution,
}

impl Mutation {
    /// Parse and range-check the payload of an (entity, action) pair.
    pub fn parse(entity: EntityKind, action: SyncAction, payload: &Value) -> Result<Self> {
        let mutation = match (entity, action) {
            (EntityKind::SaleItems, _) => {
                return Err(Error::validation(
                    "sale_items cannot be synced on their own; embed them in the parent sale",
                ))
            }
            (EntityKind::Sales, SyncAction::Update) => {
                return Err(Error::validation("update is not supported for sales"))
            }
            (EntityKind::Customers, SyncAction::Insert) => {
                Self::InsertCustomer(decode(entity, payload)?)
            }
            (EntityKind::Customers, SyncAction::Update) => {
                Self::UpdateCustomer(decode(entity, payload)?)
            }
            (EntityKind::Customers, SyncAction::Delete) => {
                decode::<Empty>(entity, payload)?;
                Self::DeleteCustomer
            }
            (EntityKind::Sales, SyncAction::Insert) => Self::InsertSale(decode(entity, payload)?),
            (EntityKind::Sales, SyncAction::Delete) => {
                decode::<Empty>(entity, payload)?;
                Self::DeleteSale
            }
            (EntityKind::Payments, SyncAction::Insert) => {
                Self::InsertPayment(decode(entity, payload)?)
            }
            (EntityKind::Payments, SyncAction::Update) => {
                Self::UpdatePayment(decode(entity, payload)?)
            }
            (EntityKind::Payments, SyncAction::Delete) => {
                decode::<Empty>(entity, payload)?;
                Self::DeletePayment
            }
            (EntityKind::Distributions, SyncAction::Insert) => {
                Self::InsertDistribution(decode(entity, payload)?)
            }
            (EntityKind::Distributions, SyncAction::Update) => {
                Self::UpdateDistribution(decode(entity, payload)?)
            }
            (EntityKind::Distributions, SyncAction::Delete) => {
                decode::<Empty>(entity, payload)?;
                Self::DeleteDistribution
            }
        };
        mutation.check()?;
        Ok(mutation)
    }

    fn check(&self) -> Result<()> {
        match self {
            Self::InsertCustomer(fields) => non_blank(&fields.name, "customer name"),
            Self::UpdateCustomer(patch) => patch
                .name
                .as_deref()
                .map_or(Ok(()), |name| non_blank(name, "customer name")),
            Self::InsertSale(fields) => {
                non_blank(&fields.customer_id, "customerId")?;
                if fields.items.is_empty() {
                    return Err(Error::validation("a sale needs at least one item"));
                }
                if fields.amount_paid < 0 {
                    return Err(Error::validation("amountPaid must not be negative"));
                }
                for item in &fields.items {
                    non_blank(&item.variant_id, "variantId")?;
                    positive(item.quantity, "quantity")?;
                    non_negative(item.unit_price, "unitPrice")?;
                }
                Ok(())
            }
            Self::InsertPayment(fields) => {
                non_blank(&fields.sale_id, "saleId")?;
                positive(fields.amount, "amount")
            }
            Self::UpdatePayment(patch) => patch
                .amount
                .map_or(Ok(()), |amount| positive(amount, "amount")),
            Self::InsertDistribution(fields) => {
                non_blank(&fields.variant_id, "variantId")?;
                positive(fields.quantity, "quantity")
            }
            Self::UpdateDistribution(patch) => {
                if let Some(variant_id) = &patch.variant_id {
                    non_blank(variant_id, "variantId")?;
                }
                patch
                    .quantity
                    .map_or(Ok(()), |quantity| positive(quantity, "quantity"))
            }
            Self::DeleteCustomer
            | Self::DeleteSale
            | Self::DeletePayment
            | Self::DeleteDistribution => Ok(()),
        }
    }
}

/// Decode a payload into a closed struct. A missing payload counts as `{}`.
fn decode<T: DeserializeOwned>(entity: EntityKind, payload: &Value) -> Result<T> {
    let payload = if payload.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        payload.clone()
    };
    serde_json::from_value(payload)
        .map_err(|error| Error::validation(format!("invalid {entity} payload: {error}")))
}

fn non_blank(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn positive(value: i64, field: &str) -> Result<()> {
    if value <= 0 {
        return Err(Error::validation(format!("{field} must be positive")));
    }
    Ok(())
}

fn non_negative(value: i64, field: &str) -> Result<()> {
    if value < 0 {
        return Err(Error::validation(format!("{field} must not be negative")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(entity: EntityKind, action: SyncAction, payload: Value) -> Result<Mutation> {
        Mutation::parse(entity, action, &payload)
    }

    #[test]
    fn parses_customer_insert() {
        let mutation = parse(
            EntityKind::Customers,
            SyncAction::Insert,
            json!({"name": "Corner Store", "phone": "555-0100"}),
        )
        .unwrap();
        let Mutation::InsertCustomer(fields) = mutation else {
            panic!("expected customer insert");
        };
        assert_eq!(fields.phone.as_deref(), Some("555-0100"));
    }

    #[test]
    fn rejects_unknown_and_missing_fields() {
        let unknown = parse(
            EntityKind::Customers,
            SyncAction::Insert,
            json!({"name": "A", "vip": true}),
        )
        .unwrap_err();
        assert!(unknown.to_string().contains("unknown field"));

        let missing = parse(EntityKind::Customers, SyncAction::Insert, json!({})).unwrap_err();
        assert!(missing.to_string().contains("missing field"));
    }

    #[test]
    fn rejects_unsupported_combinations() {
        let error = parse(EntityKind::Sales, SyncAction::Update, json!({})).unwrap_err();
        assert!(error.to_string().contains("not supported for sales"));

        for action in [SyncAction::Insert, SyncAction::Update, SyncAction::Delete] {
            let error = parse(EntityKind::SaleItems, action, json!({})).unwrap_err();
            assert_eq!(error.code(), "VALIDATION_ERROR");
        }
    }

    #[test]
    fn checks_sale_ranges() {
        let sale = |items: Value| {
            parse(
                EntityKind::Sales,
                SyncAction::Insert,
                json!({"customerId": "c-1", "items": items}),
            )
        };
        assert!(sale(json!([{"variantId": "v", "quantity": 2, "unitPrice": 5}])).is_ok());
        assert!(sale(json!([])).is_err());
        assert!(sale(json!([{"variantId": "v", "quantity": 0, "unitPrice": 5}])).is_err());
        assert!(sale(json!([{"variantId": "v", "quantity": 1, "unitPrice": -5}])).is_err());
    }

    #[test]
    fn deletes_accept_only_empty_payloads() {
        assert_eq!(
            parse(EntityKind::Payments, SyncAction::Delete, Value::Null).unwrap(),
            Mutation::DeletePayment
        );
        assert!(parse(
            EntityKind::Payments,
            SyncAction::Delete,
            json!({"reason": "typo"})
        )
        .is_err());
    }

    #[test]
    fn payment_method_defaults_to_cash() {
        let mutation = parse(
            EntityKind::Payments,
            SyncAction::Insert,
            json!({"saleId": "s-1", "amount": 10}),
        )
        .unwrap();
        let Mutation::InsertPayment(fields) = mutation else {
            panic!("expected payment insert");
        };
        assert_eq!(fields.method, PaymentMethod::Cash);
        assert!(parse(
            EntityKind::Payments,
            SyncAction::Insert,
            json!({"saleId": "s-1", "amount": 0})
        )
        .is_err());
    }
}
