//! Device-side stores: the operation queue, the id map and key/value state

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite uses i64 for LIMIT and counts

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{EntityKind, NewOperation, QueuedOperation};
use crate::util::{compact_text, millis_to_datetime};

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for the durable local operation queue
pub trait ClientQueueRepository: Send + Sync {
    fn enqueue(
        &self,
        uow: &UnitOfWork<'_>,
        id: &str,
        operation: &NewOperation,
        client_timestamp: DateTime<Utc>,
    ) -> Result<QueuedOperation>;

    fn get(&self, uow: &UnitOfWork<'_>, id: &str) -> Result<Option<QueuedOperation>>;

    /// Queued operations in enqueue order
    fn pending(&self, uow: &UnitOfWork<'_>, limit: Option<usize>)
        -> Result<Vec<QueuedOperation>>;

    fn count(&self, uow: &UnitOfWork<'_>) -> Result<usize>;

    /// Operations whose last attempt failed
    fn failed(&self, uow: &UnitOfWork<'_>) -> Result<Vec<QueuedOperation>>;

    /// Drop a confirmed operation. Returns whether it was queued.
    fn remove(&self, uow: &UnitOfWork<'_>, id: &str) -> Result<bool>;

    /// Count a failed attempt and keep the error for display
    fn record_failure(&self, uow: &UnitOfWork<'_>, id: &str, error: &str) -> Result<()>;

    fn clear(&self, uow: &UnitOfWork<'_>) -> Result<usize>;

    /// Point queued operations at the server id of a reconciled entity
    fn rewrite_entity_id(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
    ) -> Result<usize>;
}

/// Trait for the device copy of temp id mappings
pub trait ClientIdMapRepository: Send + Sync {
    fn record(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
        now_ms: i64,
    ) -> Result<()>;

    fn resolve(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
    ) -> Result<Option<String>>;
}

/// Trait for small key/value client state
pub trait ClientStateRepository: Send + Sync {
    fn get(&self, uow: &UnitOfWork<'_>, key: &str) -> Result<Option<String>>;

    fn set(&self, uow: &UnitOfWork<'_>, key: &str, value: &str) -> Result<()>;
}

/// `SQLite` implementation of the client stores
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteClientStore;

const OPERATION_COLUMNS: &str =
    "seq, id, entity, action, entity_id, payload, client_timestamp, attempts, last_error";

impl SqliteClientStore {
    fn parse_operation(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedOperation> {
        Ok(QueuedOperation {
            seq: row.get(0)?,
            id: row.get(1)?,
            entity: columns::text(row, 2)?,
            action: columns::text(row, 3)?,
            entity_id: row.get(4)?,
            payload: columns::json(row, 5)?,
            client_timestamp: millis_to_datetime(row.get(6)?),
            attempts: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    fn query_operations(
        uow: &UnitOfWork<'_>,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<QueuedOperation>> {
        let mut stmt = uow.connection().prepare(sql)?;
        let operations = stmt
            .query_map(params, Self::parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(operations)
    }
}

impl ClientQueueRepository for SqliteClientStore {
    fn enqueue(
        &self,
        uow: &UnitOfWork<'_>,
        id: &str,
        operation: &NewOperation,
        client_timestamp: DateTime<Utc>,
    ) -> Result<QueuedOperation> {
        let conn = uow.connection();
        conn.execute(
            "INSERT INTO client_operations
                (id, entity, action, entity_id, payload, client_timestamp, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                id,
                operation.entity.as_str(),
                operation.action.as_str(),
                operation.entity_id,
                serde_json::to_string(&operation.payload)?,
                client_timestamp.timestamp_millis()
            ],
        )?;

        Ok(QueuedOperation {
            seq: conn.last_insert_rowid(),
            id: id.to_string(),
            entity: operation.entity,
            action: operation.action,
            entity_id: operation.entity_id.clone(),
            payload: operation.payload.clone(),
            client_timestamp: millis_to_datetime(client_timestamp.timestamp_millis()),
            attempts: 0,
            last_error: None,
        })
    }

    fn get(&self, uow: &UnitOfWork<'_>, id: &str) -> Result<Option<QueuedOperation>> {
        let operation = uow
            .connection()
            .query_row(
                &format!("SELECT {OPERATION_COLUMNS} FROM client_operations WHERE id = ?1"),
                params![id],
                Self::parse_operation,
            )
            .optional()?;
        Ok(operation)
    }

    fn pending(
        &self,
        uow: &UnitOfWork<'_>,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedOperation>> {
        // A negative LIMIT means no limit in SQLite
        let limit = limit.map_or(-1, |limit| limit as i64);
        Self::query_operations(
            uow,
            &format!("SELECT {OPERATION_COLUMNS} FROM client_operations ORDER BY seq LIMIT ?1"),
            params![limit],
        )
    }

    fn count(&self, uow: &UnitOfWork<'_>) -> Result<usize> {
        let count: i64 =
            uow.connection()
                .query_row("SELECT COUNT(*) FROM client_operations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn failed(&self, uow: &UnitOfWork<'_>) -> Result<Vec<QueuedOperation>> {
        Self::query_operations(
            uow,
            &format!(
                "SELECT {OPERATION_COLUMNS} FROM client_operations
                 WHERE last_error IS NOT NULL ORDER BY seq"
            ),
            [],
        )
    }

    fn remove(&self, uow: &UnitOfWork<'_>, id: &str) -> Result<bool> {
        let rows = uow
            .connection()
            .execute("DELETE FROM client_operations WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn record_failure(&self, uow: &UnitOfWork<'_>, id: &str, error: &str) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE client_operations SET attempts = attempts + 1, last_error = ?1 WHERE id = ?2",
            params![compact_text(error), id],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("queued operation {id}")));
        }
        Ok(())
    }

    fn clear(&self, uow: &UnitOfWork<'_>) -> Result<usize> {
        let rows = uow.connection().execute("DELETE FROM client_operations", [])?;
        Ok(rows)
    }

    fn rewrite_entity_id(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
    ) -> Result<usize> {
        let rows = uow.connection().execute(
            "UPDATE client_operations SET entity_id = ?1 WHERE entity = ?2 AND entity_id = ?3",
            params![server_id, entity.as_str(), temp_id],
        )?;
        Ok(rows)
    }
}

impl ClientIdMapRepository for SqliteClientStore {
    fn record(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
        now_ms: i64,
    ) -> Result<()> {
        uow.connection().execute(
            "INSERT OR REPLACE INTO client_id_mappings (entity, temp_id, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entity.as_str(), temp_id, server_id, now_ms],
        )?;
        Ok(())
    }

    fn resolve(
        &self,
        uow: &UnitOfWork<'_>,
        entity: EntityKind,
        temp_id: &str,
    ) -> Result<Option<String>> {
        let server_id = uow
            .connection()
            .query_row(
                "SELECT server_id FROM client_id_mappings WHERE entity = ?1 AND temp_id = ?2",
                params![entity.as_str(), temp_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(server_id)
    }
}

impl ClientStateRepository for SqliteClientStore {
    fn get(&self, uow: &UnitOfWork<'_>, key: &str) -> Result<Option<String>> {
        let value = uow
            .connection()
            .query_row(
                "SELECT value FROM client_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, uow: &UnitOfWork<'_>, key: &str, value: &str) -> Result<()> {
        uow.connection().execute(
            "INSERT OR REPLACE INTO client_state (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::SyncAction;
    use serde_json::json;

    fn new_op(entity_id: &str) -> NewOperation {
        NewOperation {
            entity: EntityKind::Customers,
            action: SyncAction::Update,
            entity_id: entity_id.to_string(),
            payload: json!({"name": "Corner Store"}),
        }
    }

    #[test]
    fn test_queue_preserves_enqueue_order() {
        let mut db = Database::open_in_memory().unwrap();
        let store = SqliteClientStore;
        let uow = db.begin().unwrap();

        for id in ["op-3", "op-1", "op-2"] {
            store.enqueue(&uow, id, &new_op("c-1"), Utc::now()).unwrap();
        }

        let ids: Vec<_> = store
            .pending(&uow, None)
            .unwrap()
            .into_iter()
            .map(|op| op.id)
            .collect();
        assert_eq!(ids, vec!["op-3", "op-1", "op-2"]);
        assert_eq!(store.pending(&uow, Some(2)).unwrap().len(), 2);
        assert_eq!(store.count(&uow).unwrap(), 3);
    }

    #[test]
    fn test_failures_are_counted_and_kept() {
        let mut db = Database::open_in_memory().unwrap();
        let store = SqliteClientStore;
        let uow = db.begin().unwrap();

        store.enqueue(&uow, "op-1", &new_op("c-1"), Utc::now()).unwrap();
        store.record_failure(&uow, "op-1", "offline").unwrap();
        store.record_failure(&uow, "op-1", "still offline").unwrap();

        let op = ClientQueueRepository::get(&store, &uow, "op-1")
            .unwrap()
            .unwrap();
        assert_eq!(op.attempts, 2);
        assert_eq!(op.last_error.as_deref(), Some("still offline"));
        assert_eq!(store.failed(&uow).unwrap().len(), 1);

        assert!(store.remove(&uow, "op-1").unwrap());
        assert!(!store.remove(&uow, "op-1").unwrap());
        assert!(store.record_failure(&uow, "op-1", "gone").is_err());
    }

    #[test]
    fn test_rewrite_entity_id_only_touches_matching_entity() {
        let mut db = Database::open_in_memory().unwrap();
        let store = SqliteClientStore;
        let uow = db.begin().unwrap();

        store.enqueue(&uow, "op-1", &new_op("tmp_a"), Utc::now()).unwrap();
        let mut sale = new_op("tmp_a");
        sale.entity = EntityKind::Sales;
        store.enqueue(&uow, "op-2", &sale, Utc::now()).unwrap();

        let rewritten = store
            .rewrite_entity_id(&uow, EntityKind::Customers, "tmp_a", "srv-a")
            .unwrap();
        assert_eq!(rewritten, 1);

        let ops = store.pending(&uow, None).unwrap();
        assert_eq!(ops[0].entity_id, "srv-a");
        assert_eq!(ops[1].entity_id, "tmp_a");
        assert_eq!(store.clear(&uow).unwrap(), 2);
    }

    #[test]
    fn test_state_and_id_map() {
        let mut db = Database::open_in_memory().unwrap();
        let store = SqliteClientStore;
        let uow = db.begin().unwrap();

        assert!(ClientStateRepository::get(&store, &uow, "cursor")
            .unwrap()
            .is_none());
        store.set(&uow, "cursor", "a").unwrap();
        store.set(&uow, "cursor", "b").unwrap();
        assert_eq!(
            ClientStateRepository::get(&store, &uow, "cursor")
                .unwrap()
                .as_deref(),
            Some("b")
        );

        store
            .record(&uow, EntityKind::Customers, "tmp_a", "srv-a", 0)
            .unwrap();
        assert_eq!(
            store
                .resolve(&uow, EntityKind::Customers, "tmp_a")
                .unwrap()
                .as_deref(),
            Some("srv-a")
        );
    }
}
