//! Durable local operation queue.

use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::{ClientQueueRepository, Database, SqliteClientStore};
use crate::error::{Error, Result};
use crate::models::{EntityKind, NewOperation, QueuedOperation};
use crate::time::TimeSource;
use crate::util::TEMP_ID_PREFIX;

/// Generate a temporary id for an entity created while offline.
pub fn new_temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", Uuid::now_v7())
}

/// Async facade over the local queue table.
///
/// Operations stay queued until the server confirms them or the queue is
/// cleared by hand.
#[derive(Clone)]
pub struct OperationQueue {
    db: Arc<Mutex<Database>>,
    store: SqliteClientStore,
    clock: Arc<dyn TimeSource>,
}

impl OperationQueue {
    pub fn new(db: Arc<Mutex<Database>>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            db,
            store: SqliteClientStore,
            clock,
        }
    }

    /// Shared handle to the local database
    pub fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    /// Persist a local mutation stamped with the current client time.
    pub async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation> {
        if operation.entity_id.trim().is_empty() {
            return Err(Error::validation("queued operation needs an entity id"));
        }
        if operation.entity == EntityKind::SaleItems {
            return Err(Error::validation(
                "sale_items are queued inside their parent sale",
            ));
        }

        let id = Uuid::now_v7().to_string();
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        let queued = self
            .store
            .enqueue(&uow, &id, &operation, self.clock.now())?;
        uow.commit()?;

        tracing::debug!(
            operation_id = %queued.id,
            entity = %queued.entity,
            action = %queued.action,
            "Queued local operation"
        );
        Ok(queued)
    }

    pub async fn get(&self, id: &str) -> Result<Option<QueuedOperation>> {
        let mut db = self.db.lock().await;
        let uow = db.read()?;
        ClientQueueRepository::get(&self.store, &uow, id)
    }

    /// Queued operations in enqueue order
    pub async fn pending(&self, limit: Option<usize>) -> Result<Vec<QueuedOperation>> {
        let mut db = self.db.lock().await;
        let uow = db.read()?;
        self.store.pending(&uow, limit)
    }

    pub async fn len(&self) -> Result<usize> {
        let mut db = self.db.lock().await;
        let uow = db.read()?;
        self.store.count(&uow)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Operations whose last attempt failed
    pub async fn failed(&self) -> Result<Vec<QueuedOperation>> {
        let mut db = self.db.lock().await;
        let uow = db.read()?;
        self.store.failed(&uow)
    }

    /// Remove an operation the server confirmed.
    pub async fn mark_synced(&self, id: &str) -> Result<bool> {
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        let removed = self.store.remove(&uow, id)?;
        uow.commit()?;
        Ok(removed)
    }

    /// Count a failed attempt; the operation stays queued for retry.
    pub async fn mark_error(&self, id: &str, error: &str) -> Result<()> {
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        self.store.record_failure(&uow, id, error)?;
        uow.commit()
    }

    /// Drop every queued operation. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        let removed = self.store.clear(&uow)?;
        uow.commit()?;
        tracing::warn!(removed, "Cleared local operation queue");
        Ok(removed)
    }

    /// Point queued operations at the server id of a reconciled entity.
    pub async fn rewrite_entity_id(
        &self,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
    ) -> Result<usize> {
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        let rewritten = self
            .store
            .rewrite_entity_id(&uow, entity, temp_id, server_id)?;
        uow.commit()?;
        Ok(rewritten)
    }
}
