//! Device copy of temporary id → server id mappings, so the UI can swap ids
//! once an insert is confirmed.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{ClientIdMapRepository, Database, SqliteClientStore};
use crate::error::Result;
use crate::models::EntityKind;
use crate::time::TimeSource;
use crate::util::is_temp_id;

#[derive(Clone)]
pub struct IdMap {
    db: Arc<Mutex<Database>>,
    store: SqliteClientStore,
    clock: Arc<dyn TimeSource>,
}

impl IdMap {
    pub fn new(db: Arc<Mutex<Database>>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            db,
            store: SqliteClientStore,
            clock,
        }
    }

    pub async fn record(&self, entity: EntityKind, temp_id: &str, server_id: &str) -> Result<()> {
        let mut db = self.db.lock().await;
        let uow = db.begin()?;
        ClientIdMapRepository::record(
            &self.store,
            &uow,
            entity,
            temp_id,
            server_id,
            self.clock.now().timestamp_millis(),
        )?;
        uow.commit()?;
        tracing::debug!(%entity, temp_id, server_id, "Recorded id mapping");
        Ok(())
    }

    pub async fn resolve(&self, entity: EntityKind, temp_id: &str) -> Result<Option<String>> {
        let mut db = self.db.lock().await;
        let uow = db.read()?;
        ClientIdMapRepository::resolve(&self.store, &uow, entity, temp_id)
    }

    /// The server id for `id` when it is a reconciled temporary id, else `id`.
    pub async fn current_id(&self, entity: EntityKind, id: &str) -> Result<String> {
        if !is_temp_id(id) {
            return Ok(id.to_string());
        }
        Ok(self
            .resolve(entity, id)
            .await?
            .unwrap_or_else(|| id.to_string()))
    }
}
