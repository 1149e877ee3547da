//! Server-side temporary id → server id mappings

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::models::EntityKind;

use super::unit_of_work::UnitOfWork;

pub trait IdMappingRepository: Send + Sync {
    /// Record the server id assigned to a client temporary id
    fn record(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
        now_ms: i64,
    ) -> Result<()>;

    fn resolve(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        entity: EntityKind,
        temp_id: &str,
    ) -> Result<Option<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteIdMappingRepository;

impl IdMappingRepository for SqliteIdMappingRepository {
    fn record(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        entity: EntityKind,
        temp_id: &str,
        server_id: &str,
        now_ms: i64,
    ) -> Result<()> {
        uow.connection().execute(
            "INSERT INTO sync_id_mappings (business_id, entity, temp_id, server_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![business_id, entity.as_str(), temp_id, server_id, now_ms],
        )?;
        Ok(())
    }

    fn resolve(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        entity: EntityKind,
        temp_id: &str,
    ) -> Result<Option<String>> {
        let server_id = uow
            .connection()
            .query_row(
                "SELECT server_id FROM sync_id_mappings
                 WHERE business_id = ?1 AND entity = ?2 AND temp_id = ?3",
                params![business_id, entity.as_str(), temp_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(server_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_mappings_are_scoped() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteIdMappingRepository;
        let uow = db.begin().unwrap();

        repo.record(&uow, "biz-1", EntityKind::Customers, "tmp_1", "srv-1", 0)
            .unwrap();

        assert_eq!(
            repo.resolve(&uow, "biz-1", EntityKind::Customers, "tmp_1")
                .unwrap()
                .as_deref(),
            Some("srv-1")
        );
        assert!(repo
            .resolve(&uow, "biz-1", EntityKind::Sales, "tmp_1")
            .unwrap()
            .is_none());
        assert!(repo
            .resolve(&uow, "biz-2", EntityKind::Customers, "tmp_1")
            .unwrap()
            .is_none());
        // Each temp id maps once
        assert!(repo
            .record(&uow, "biz-1", EntityKind::Customers, "tmp_1", "srv-2", 0)
            .is_err());
    }
}
