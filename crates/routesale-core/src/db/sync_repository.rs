//! Durable dedup records for applied sync operations

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT and counters

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{SyncOperationRecord, SyncStatus};
use crate::util::{compact_text, millis_to_datetime};

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for sync operation record storage
pub trait SyncOperationRepository: Send + Sync {
    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
    ) -> Result<Option<SyncOperationRecord>>;

    /// Insert a new `pending` record. Fails if one already exists.
    fn insert_pending(&self, uow: &UnitOfWork<'_>, record: &SyncOperationRecord) -> Result<()>;

    /// Put a failed or stale record back into `pending` for another attempt,
    /// taking the resubmitted operation body. Returns the attempt count.
    fn restart(&self, uow: &UnitOfWork<'_>, record: &SyncOperationRecord) -> Result<u32>;

    /// Finalize a record. `payload` replaces the submitted body so that
    /// references read back from the feed carry server ids.
    fn mark_processed(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
        resolved_entity_id: &str,
        payload: &serde_json::Value,
        processed_at: DateTime<Utc>,
    ) -> Result<()>;

    fn mark_failed(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Latest processing time recorded for a business
    fn last_processed_at(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Processed records strictly after `since`, oldest first
    fn processed_since(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SyncOperationRecord>>;
}

/// `SQLite` implementation of `SyncOperationRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteSyncOperationRepository;

const RECORD_COLUMNS: &str = "business_id, operation_id, entity, action, entity_id, \
    resolved_entity_id, payload, client_timestamp, status, error, attempts, created_at, \
    updated_at, processed_at";

impl SqliteSyncOperationRepository {
    fn parse_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncOperationRecord> {
        Ok(SyncOperationRecord {
            business_id: row.get(0)?,
            operation_id: row.get(1)?,
            entity: columns::text(row, 2)?,
            action: columns::text(row, 3)?,
            entity_id: row.get(4)?,
            resolved_entity_id: row.get(5)?,
            payload: columns::json(row, 6)?,
            client_timestamp: millis_to_datetime(row.get(7)?),
            status: columns::text(row, 8)?,
            error: row.get(9)?,
            attempts: row.get(10)?,
            created_at: millis_to_datetime(row.get(11)?),
            updated_at: millis_to_datetime(row.get(12)?),
            processed_at: row.get::<_, Option<i64>>(13)?.map(millis_to_datetime),
        })
    }

    fn expect_one(rows: usize, operation_id: &str) -> Result<()> {
        if rows == 0 {
            return Err(Error::not_found(format!("sync operation {operation_id}")));
        }
        Ok(())
    }
}

impl SyncOperationRepository for SqliteSyncOperationRepository {
    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
    ) -> Result<Option<SyncOperationRecord>> {
        let record = uow
            .connection()
            .query_row(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM sync_operations
                     WHERE business_id = ?1 AND operation_id = ?2"
                ),
                params![business_id, operation_id],
                Self::parse_record,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_pending(&self, uow: &UnitOfWork<'_>, record: &SyncOperationRecord) -> Result<()> {
        uow.connection().execute(
            &format!(
                "INSERT INTO sync_operations ({RECORD_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                record.business_id,
                record.operation_id,
                record.entity.as_str(),
                record.action.as_str(),
                record.entity_id,
                record.resolved_entity_id,
                serde_json::to_string(&record.payload)?,
                record.client_timestamp.timestamp_millis(),
                SyncStatus::Pending.as_str(),
                record.error,
                record.attempts,
                record.created_at.timestamp_millis(),
                record.updated_at.timestamp_millis(),
                record.processed_at.map(|at| at.timestamp_millis())
            ],
        )?;
        Ok(())
    }

    fn restart(&self, uow: &UnitOfWork<'_>, record: &SyncOperationRecord) -> Result<u32> {
        let attempts = uow
            .connection()
            .query_row(
                "UPDATE sync_operations
                 SET entity = ?1, action = ?2, entity_id = ?3, payload = ?4, client_timestamp = ?5,
                     status = 'pending', error = NULL, attempts = attempts + 1, updated_at = ?6
                 WHERE business_id = ?7 AND operation_id = ?8 AND status != 'processed'
                 RETURNING attempts",
                params![
                    record.entity.as_str(),
                    record.action.as_str(),
                    record.entity_id,
                    serde_json::to_string(&record.payload)?,
                    record.client_timestamp.timestamp_millis(),
                    record.updated_at.timestamp_millis(),
                    record.business_id,
                    record.operation_id
                ],
                |row| row.get::<_, u32>(0),
            )
            .optional()?;
        attempts.ok_or_else(|| Error::not_found(format!("sync operation {}", record.operation_id)))
    }

    fn mark_processed(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
        resolved_entity_id: &str,
        payload: &serde_json::Value,
        processed_at: DateTime<Utc>,
    ) -> Result<()> {
        let at = processed_at.timestamp_millis();
        let rows = uow.connection().execute(
            "UPDATE sync_operations
             SET status = 'processed', error = NULL, resolved_entity_id = ?1,
                 payload = ?2, processed_at = ?3, updated_at = ?3
             WHERE business_id = ?4 AND operation_id = ?5",
            params![
                resolved_entity_id,
                serde_json::to_string(payload)?,
                at,
                business_id,
                operation_id
            ],
        )?;
        Self::expect_one(rows, operation_id)
    }

    fn mark_failed(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        operation_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE sync_operations SET status = 'failed', error = ?1, updated_at = ?2
             WHERE business_id = ?3 AND operation_id = ?4 AND status != 'processed'",
            params![
                compact_text(error),
                now.timestamp_millis(),
                business_id,
                operation_id
            ],
        )?;
        Self::expect_one(rows, operation_id)
    }

    fn last_processed_at(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let last: Option<i64> = uow.connection().query_row(
            "SELECT MAX(processed_at) FROM sync_operations
             WHERE business_id = ?1 AND status = 'processed'",
            params![business_id],
            |row| row.get(0),
        )?;
        Ok(last.map(millis_to_datetime))
    }

    fn processed_since(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<SyncOperationRecord>> {
        let mut stmt = uow.connection().prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM sync_operations
             WHERE business_id = ?1 AND status = 'processed'
               AND (?2 IS NULL OR processed_at > ?2)
             ORDER BY processed_at ASC, operation_id ASC
             LIMIT ?3"
        ))?;
        let records = stmt
            .query_map(
                params![
                    business_id,
                    since.map(|at| at.timestamp_millis()),
                    limit as i64
                ],
                Self::parse_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}
