//! Distribution repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Distribution, DistributionId};
use crate::util::format_date;

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for stock distribution storage operations
pub trait DistributionRepository: Send + Sync {
    fn insert(&self, uow: &UnitOfWork<'_>, distribution: &Distribution) -> Result<()>;

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &DistributionId,
    ) -> Result<Option<Distribution>>;

    fn update(&self, uow: &UnitOfWork<'_>, distribution: &Distribution) -> Result<()>;

    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &DistributionId,
        now_ms: i64,
    ) -> Result<()>;
}

/// `SQLite` implementation of `DistributionRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDistributionRepository;

impl SqliteDistributionRepository {
    fn parse_distribution(row: &rusqlite::Row<'_>) -> rusqlite::Result<Distribution> {
        Ok(Distribution {
            id: columns::text(row, 0)?,
            business_id: row.get(1)?,
            seller_id: row.get(2)?,
            variant_id: row.get(3)?,
            quantity: row.get(4)?,
            distribution_date: columns::date(row, 5)?,
            notes: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            is_deleted: columns::flag(row, 9)?,
        })
    }
}

impl DistributionRepository for SqliteDistributionRepository {
    fn insert(&self, uow: &UnitOfWork<'_>, distribution: &Distribution) -> Result<()> {
        uow.connection().execute(
            "INSERT INTO distributions
                (id, business_id, seller_id, variant_id, quantity, distribution_date,
                 notes, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                distribution.id.as_str(),
                distribution.business_id,
                distribution.seller_id,
                distribution.variant_id,
                distribution.quantity,
                format_date(distribution.distribution_date),
                distribution.notes,
                distribution.created_at,
                distribution.updated_at,
                i32::from(distribution.is_deleted)
            ],
        )?;
        Ok(())
    }

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &DistributionId,
    ) -> Result<Option<Distribution>> {
        let distribution = uow
            .connection()
            .query_row(
                "SELECT id, business_id, seller_id, variant_id, quantity, distribution_date,
                        notes, created_at, updated_at, is_deleted
                 FROM distributions WHERE id = ?1 AND business_id = ?2 AND is_deleted = 0",
                params![id.as_str(), business_id],
                Self::parse_distribution,
            )
            .optional()?;
        Ok(distribution)
    }

    fn update(&self, uow: &UnitOfWork<'_>, distribution: &Distribution) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE distributions
             SET seller_id = ?1, variant_id = ?2, quantity = ?3, distribution_date = ?4,
                 notes = ?5, updated_at = ?6
             WHERE id = ?7 AND business_id = ?8 AND is_deleted = 0",
            params![
                distribution.seller_id,
                distribution.variant_id,
                distribution.quantity,
                format_date(distribution.distribution_date),
                distribution.notes,
                distribution.updated_at,
                distribution.id.as_str(),
                distribution.business_id
            ],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("distribution {}", distribution.id)));
        }
        Ok(())
    }

    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &DistributionId,
        now_ms: i64,
    ) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE distributions SET is_deleted = 1, updated_at = ?1
             WHERE id = ?2 AND business_id = ?3 AND is_deleted = 0",
            params![now_ms, id.as_str(), business_id],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("distribution {id}")));
        }
        Ok(())
    }
}
