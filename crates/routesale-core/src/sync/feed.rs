//! Change feed: processed operations, oldest first, after a cursor.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::SyncSettings;
use crate::context::AuthContext;
use crate::db::{Database, SyncOperationRepository};
use crate::error::Result;

use super::wire::{Change, ChangesResponse};

pub struct ChangeFeed {
    operations: Arc<dyn SyncOperationRepository>,
    settings: SyncSettings,
}

impl ChangeFeed {
    #[must_use]
    pub fn new(operations: Arc<dyn SyncOperationRepository>, settings: SyncSettings) -> Self {
        Self {
            operations,
            settings,
        }
    }

    /// Changes processed strictly after `since`, scoped to the caller's
    /// business. `next_since` is the last change's processing time, or
    /// `since` itself when the page is empty.
    pub fn get_changes(
        &self,
        db: &mut Database,
        ctx: &AuthContext,
        since: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<ChangesResponse> {
        let limit = self.settings.clamp_feed_limit(limit);
        let uow = db.read()?;
        let records = self
            .operations
            .processed_since(&uow, &ctx.business_id, since, limit)?;
        drop(uow);

        let changes: Vec<Change> = records.into_iter().map(Change::from).collect();
        let next_since = changes.last().map(|change| change.processed_at).or(since);

        tracing::debug!(
            business_id = %ctx.business_id,
            count = changes.len(),
            "Served change feed page"
        );
        Ok(ChangesResponse {
            changes,
            next_since,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Role;
    use crate::db::{Repositories, SqliteSyncOperationRepository};
    use crate::sync::{RawOperation, SyncBatchProcessor};
    use crate::time::FixedTimeSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn customer(index: usize) -> RawOperation {
        serde_json::from_value(json!({
            "operationId": format!("op-{index}"),
            "entity": "customers",
            "action": "insert",
            "entityId": format!("tmp_{index}"),
            "payload": {"name": format!("Customer {index}")},
            "clientTimestamp": "2026-10-18T07:00:00Z"
        }))
        .unwrap()
    }

    #[test]
    fn pages_through_changes_in_order() {
        let mut db = Database::open_in_memory().unwrap();
        let clock = Arc::new(FixedTimeSource::new(Utc::now()));
        let ctx = AuthContext::new("biz-1", "seller-1", Role::Seller).unwrap();
        let processor =
            SyncBatchProcessor::new(Repositories::sqlite(), clock, SyncSettings::default());
        processor
            .process_batch(&mut db, &ctx, (0..5).map(customer).collect())
            .unwrap();

        let feed = ChangeFeed::new(
            Arc::new(SqliteSyncOperationRepository),
            SyncSettings::default(),
        );
        let first = feed.get_changes(&mut db, &ctx, None, Some(3)).unwrap();
        let ids: Vec<_> = first.changes.iter().map(|c| c.operation_id.as_str()).collect();
        assert_eq!(ids, ["op-0", "op-1", "op-2"]);
        assert!(first.changes.iter().all(|c| !c.entity_id.starts_with("tmp_")));

        let second = feed
            .get_changes(&mut db, &ctx, first.next_since, Some(3))
            .unwrap();
        let ids: Vec<_> = second.changes.iter().map(|c| c.operation_id.as_str()).collect();
        assert_eq!(ids, ["op-3", "op-4"]);

        let empty = feed
            .get_changes(&mut db, &ctx, second.next_since, None)
            .unwrap();
        assert!(empty.changes.is_empty());
        assert_eq!(empty.next_since, second.next_since);
    }

    #[test]
    fn payload_references_carry_server_ids() {
        let mut db = Database::open_in_memory().unwrap();
        let clock = Arc::new(FixedTimeSource::new(Utc::now()));
        let ctx = AuthContext::new("biz-1", "seller-1", Role::Seller).unwrap();
        let batch: Vec<RawOperation> = serde_json::from_value(json!([
            {
                "operationId": "op-c",
                "entity": "customers",
                "action": "insert",
                "entityId": "tmp_c1",
                "payload": {"name": "Corner Store"},
                "clientTimestamp": "2026-10-18T07:00:00Z"
            },
            {
                "operationId": "op-s",
                "entity": "sales",
                "action": "insert",
                "entityId": "tmp_s1",
                "payload": {
                    "customerId": "tmp_c1",
                    "items": [{"variantId": "bread-500g", "quantity": 3, "unitPrice": 10}]
                },
                "clientTimestamp": "2026-10-18T07:01:00Z"
            },
            {
                "operationId": "op-p",
                "entity": "payments",
                "action": "insert",
                "entityId": "tmp_p1",
                "payload": {"saleId": "tmp_s1", "customerId": "tmp_c1", "amount": 10},
                "clientTimestamp": "2026-10-18T07:02:00Z"
            }
        ]))
        .unwrap();
        let response =
            SyncBatchProcessor::new(Repositories::sqlite(), clock, SyncSettings::default())
                .process_batch(&mut db, &ctx, batch)
                .unwrap();
        assert_eq!(response.summary.failed, 0, "{:?}", response.results);

        let feed = ChangeFeed::new(
            Arc::new(SqliteSyncOperationRepository),
            SyncSettings::default(),
        );
        let page = feed.get_changes(&mut db, &ctx, None, None).unwrap();
        let change = |id: &str| {
            page.changes
                .iter()
                .find(|change| change.operation_id == id)
                .unwrap()
        };
        let customer_id = change("op-c").entity_id.clone();
        let sale_id = change("op-s").entity_id.clone();

        assert_eq!(change("op-s").payload["customerId"], json!(customer_id));
        assert_eq!(change("op-s").payload["items"][0]["quantity"], json!(3));
        assert_eq!(change("op-p").payload["saleId"], json!(sale_id));
        assert_eq!(change("op-p").payload["customerId"], json!(customer_id));
    }

    #[test]
    fn other_businesses_are_invisible() {
        let mut db = Database::open_in_memory().unwrap();
        let clock = Arc::new(FixedTimeSource::new(Utc::now()));
        let owner = AuthContext::new("biz-1", "seller-1", Role::Seller).unwrap();
        let stranger = AuthContext::new("biz-2", "seller-9", Role::Viewer).unwrap();
        SyncBatchProcessor::new(Repositories::sqlite(), clock, SyncSettings::default())
            .process_batch(&mut db, &owner, vec![customer(1)])
            .unwrap();

        let feed = ChangeFeed::new(
            Arc::new(SqliteSyncOperationRepository),
            SyncSettings::default(),
        );
        let page = feed.get_changes(&mut db, &stranger, None, None).unwrap();
        assert!(page.changes.is_empty());
        assert_eq!(page.next_since, None);
    }
}
