//! Shape validation of submitted operations.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{EntityKind, SyncAction};

use super::wire::RawOperation;

/// An operation whose envelope is well formed. The payload is still
/// unchecked; it is parsed per entity when the operation is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOperation {
    pub operation_id: String,
    pub entity: EntityKind,
    pub action: SyncAction,
    pub entity_id: String,
    pub payload: Value,
    pub client_timestamp: DateTime<Utc>,
}

impl SyncOperation {
    /// Validate the envelope of a raw operation.
    pub fn from_raw(raw: RawOperation) -> Result<Self> {
        let operation_id = required(raw.operation_id, "operationId")?;
        let entity_id = required(raw.entity_id, "entityId")?;
        let entity = required(raw.entity, "entity")?.parse()?;
        let action = required(raw.action, "action")?.parse()?;
        let client_timestamp = raw
            .client_timestamp
            .as_ref()
            .ok_or_else(|| Error::validation("clientTimestamp is required"))
            .and_then(parse_timestamp)?;

        Ok(Self {
            operation_id,
            entity,
            action,
            entity_id,
            payload: raw.payload,
            client_timestamp,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| Error::validation(format!("{field} is required")))
}

/// Accept RFC 3339 strings and Unix millisecond numbers.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw.trim())
            .map(|at| at.with_timezone(&Utc))
            .map_err(|error| Error::validation(format!("invalid clientTimestamp '{raw}': {error}"))),
        Value::Number(number) => number
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| Error::validation(format!("invalid clientTimestamp {number}"))),
        other => Err(Error::validation(format!(
            "clientTimestamp must be a string or number, got {other}"
        ))),
    }
}
