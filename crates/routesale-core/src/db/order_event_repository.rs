//! Append-only order event log

use rusqlite::{params, OptionalExtension};

use crate::error::Result;
use crate::models::{OrderEvent, OrderId};

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for order event storage. Events are never updated or deleted.
pub trait OrderEventRepository: Send + Sync {
    fn append(&self, uow: &UnitOfWork<'_>, event: &OrderEvent) -> Result<()>;

    /// Look up an event by its client-supplied idempotency key
    fn find_by_key(&self, uow: &UnitOfWork<'_>, key: &str) -> Result<Option<OrderEvent>>;

    /// Full history of an order in version order
    fn list_for_order(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEvent>>;
}

/// `SQLite` implementation of `OrderEventRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteOrderEventRepository;

const EVENT_COLUMNS: &str =
    "id, order_id, business_id, event_type, version, payload, idempotency_key, actor_id, created_at";

impl SqliteOrderEventRepository {
    fn parse_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderEvent> {
        Ok(OrderEvent {
            id: columns::text(row, 0)?,
            order_id: columns::text(row, 1)?,
            business_id: row.get(2)?,
            event_type: columns::text(row, 3)?,
            version: row.get(4)?,
            payload: columns::json(row, 5)?,
            idempotency_key: row.get(6)?,
            actor_id: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

impl OrderEventRepository for SqliteOrderEventRepository {
    fn append(&self, uow: &UnitOfWork<'_>, event: &OrderEvent) -> Result<()> {
        uow.connection().execute(
            &format!("INSERT INTO order_events ({EVENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
            params![
                event.id.as_str(),
                event.order_id.as_str(),
                event.business_id,
                event.event_type.as_str(),
                event.version,
                serde_json::to_string(&event.payload)?,
                event.idempotency_key,
                event.actor_id,
                event.created_at
            ],
        )?;
        Ok(())
    }

    fn find_by_key(&self, uow: &UnitOfWork<'_>, key: &str) -> Result<Option<OrderEvent>> {
        let event = uow
            .connection()
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM order_events WHERE idempotency_key = ?1"),
                params![key],
                Self::parse_event,
            )
            .optional()?;
        Ok(event)
    }

    fn list_for_order(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        order_id: &OrderId,
    ) -> Result<Vec<OrderEvent>> {
        let mut stmt = uow.connection().prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM order_events
             WHERE order_id = ?1 AND business_id = ?2 ORDER BY version"
        ))?;
        let events = stmt
            .query_map(params![order_id.as_str(), business_id], Self::parse_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }
}
