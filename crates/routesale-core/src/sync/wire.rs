//! JSON shapes exchanged between devices and the sync endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::models::{EntityKind, SyncAction, SyncOperationRecord};

/// One submitted operation, exactly as received.
///
/// Fields are loosely typed so a malformed operation fails on its own
/// instead of rejecting the whole batch at deserialization time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOperation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub payload: Value,
    /// RFC 3339 string or Unix milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_timestamp: Option<Value>,
}

/// Outcome of one operation, reported in submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    pub operation_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable error code when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Server id of the affected entity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub server_timestamp: DateTime<Utc>,
}

impl OperationResult {
    #[must_use]
    pub fn success(
        operation_id: impl Into<String>,
        entity_id: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: true,
            error: None,
            code: None,
            entity_id: Some(entity_id.into()),
            server_timestamp: at,
        }
    }

    #[must_use]
    pub fn failure(operation_id: impl Into<String>, error: &Error, at: DateTime<Utc>) -> Self {
        Self {
            operation_id: operation_id.into(),
            success: false,
            error: Some(error.to_string()),
            code: Some(error.code().to_string()),
            entity_id: None,
            server_timestamp: at,
        }
    }

    /// The result originally reported for an already processed record.
    #[must_use]
    pub fn replay(record: &SyncOperationRecord) -> Self {
        Self {
            operation_id: record.operation_id.clone(),
            success: true,
            error: None,
            code: None,
            entity_id: Some(
                record
                    .resolved_entity_id
                    .clone()
                    .unwrap_or_else(|| record.entity_id.clone()),
            ),
            server_timestamp: record.processed_at.unwrap_or(record.updated_at),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    #[must_use]
    pub fn of(results: &[OperationResult]) -> Self {
        let succeeded = results.iter().filter(|result| result.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Response to a batch submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<OperationResult>,
    pub summary: BatchSummary,
}

/// A previously applied operation served by the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub operation_id: String,
    pub entity: EntityKind,
    pub action: SyncAction,
    pub entity_id: String,
    pub payload: Value,
    pub client_timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl From<SyncOperationRecord> for Change {
    fn from(record: SyncOperationRecord) -> Self {
        Self {
            operation_id: record.operation_id,
            entity: record.entity,
            action: record.action,
            entity_id: record.resolved_entity_id.unwrap_or(record.entity_id),
            payload: record.payload,
            client_timestamp: record.client_timestamp,
            processed_at: record.processed_at.unwrap_or(record.updated_at),
        }
    }
}

/// One page of the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    pub changes: Vec<Change>,
    /// Cursor to pass as `since` for the next page
    pub next_since: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_operation_tolerates_missing_fields() {
        let raw: RawOperation = serde_json::from_value(json!({
            "operationId": "op-1",
            "entity": "customers"
        }))
        .unwrap();
        assert_eq!(raw.operation_id.as_deref(), Some("op-1"));
        assert!(raw.entity_id.is_none());
        assert!(raw.payload.is_null());
    }

    #[test]
    fn result_omits_absent_fields() {
        let at = DateTime::from_timestamp_millis(0).unwrap();
        let value = serde_json::to_value(OperationResult::success("op-1", "id-1", at)).unwrap();
        assert_eq!(value["operationId"], "op-1");
        assert_eq!(value["entityId"], "id-1");
        assert!(value.get("error").is_none());
        assert!(value.get("code").is_none());

        let failed = OperationResult::failure("op-2", &Error::validation("bad"), at);
        let value = serde_json::to_value(failed).unwrap();
        assert_eq!(value["code"], "VALIDATION_ERROR");
        assert!(value.get("entityId").is_none());
    }
}
