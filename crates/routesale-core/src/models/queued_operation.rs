//! Device-side queued mutation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sync::{EntityKind, SyncAction};

/// A local mutation waiting for the server to confirm it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedOperation {
    /// Enqueue sequence; defines replay order
    pub seq: i64,
    /// Locally unique operation id, sent as `operationId`
    pub id: String,
    pub entity: EntityKind,
    pub action: SyncAction,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub client_timestamp: DateTime<Utc>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Input for enqueueing a new mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOperation {
    pub entity: EntityKind,
    pub action: SyncAction,
    pub entity_id: String,
    pub payload: serde_json::Value,
}
