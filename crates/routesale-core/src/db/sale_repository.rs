//! Sale repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for positions

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{OrderId, Sale, SaleId, SaleItem};
use crate::util::format_date;

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for sale storage operations. Sales are immutable once written
/// apart from their paid amount and soft deletion.
pub trait SaleRepository: Send + Sync {
    /// Insert a sale header together with its lines
    fn insert(&self, uow: &UnitOfWork<'_>, sale: &Sale) -> Result<()>;

    fn get(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &SaleId) -> Result<Option<Sale>>;

    /// The sale derived from a delivered order, if any
    fn find_by_order(&self, uow: &UnitOfWork<'_>, order_id: &OrderId) -> Result<Option<Sale>>;

    /// Persist `amount_paid` and `balance_due` after a settlement change
    fn update_settlement(&self, uow: &UnitOfWork<'_>, sale: &Sale) -> Result<()>;

    /// Soft delete a sale
    fn delete(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &SaleId) -> Result<()>;
}

/// `SQLite` implementation of `SaleRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteSaleRepository;

const SALE_COLUMNS: &str = "id, business_id, customer_id, seller_id, order_id, sale_date, \
    total_amount, amount_paid, balance_due, created_at, is_deleted";

impl SqliteSaleRepository {
    fn parse_sale(row: &rusqlite::Row<'_>) -> rusqlite::Result<Sale> {
        Ok(Sale {
            id: columns::text(row, 0)?,
            business_id: row.get(1)?,
            customer_id: columns::text(row, 2)?,
            seller_id: row.get(3)?,
            order_id: columns::optional_text(row, 4)?,
            sale_date: columns::date(row, 5)?,
            total_amount: row.get(6)?,
            amount_paid: row.get(7)?,
            balance_due: row.get(8)?,
            created_at: row.get(9)?,
            is_deleted: columns::flag(row, 10)?,
            items: Vec::new(),
        })
    }

    fn load_items(uow: &UnitOfWork<'_>, sale_id: &SaleId) -> Result<Vec<SaleItem>> {
        let mut stmt = uow.connection().prepare(
            "SELECT variant_id, quantity, unit_price, subtotal
             FROM sale_items WHERE sale_id = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map(params![sale_id.as_str()], |row| {
                Ok(SaleItem {
                    variant_id: row.get(0)?,
                    quantity: row.get(1)?,
                    unit_price: row.get(2)?,
                    subtotal: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn with_items(uow: &UnitOfWork<'_>, sale: Option<Sale>) -> Result<Option<Sale>> {
        match sale {
            Some(mut sale) => {
                sale.items = Self::load_items(uow, &sale.id)?;
                Ok(Some(sale))
            }
            None => Ok(None),
        }
    }
}

impl SaleRepository for SqliteSaleRepository {
    fn insert(&self, uow: &UnitOfWork<'_>, sale: &Sale) -> Result<()> {
        let conn = uow.connection();
        conn.execute(
            "INSERT INTO sales
                (id, business_id, customer_id, seller_id, order_id, sale_date,
                 total_amount, amount_paid, balance_due, created_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                sale.id.as_str(),
                sale.business_id,
                sale.customer_id.as_str(),
                sale.seller_id,
                sale.order_id.map(|id| id.as_str()),
                format_date(sale.sale_date),
                sale.total_amount,
                sale.amount_paid,
                sale.balance_due,
                sale.created_at,
                i32::from(sale.is_deleted)
            ],
        )?;

        let mut stmt = conn.prepare(
            "INSERT INTO sale_items (sale_id, position, variant_id, quantity, unit_price, subtotal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for (position, item) in sale.items.iter().enumerate() {
            stmt.execute(params![
                sale.id.as_str(),
                position as i64,
                item.variant_id,
                item.quantity,
                item.unit_price,
                item.subtotal
            ])?;
        }

        Ok(())
    }

    fn get(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &SaleId) -> Result<Option<Sale>> {
        let sale = uow
            .connection()
            .query_row(
                &format!(
                    "SELECT {SALE_COLUMNS} FROM sales
                     WHERE id = ?1 AND business_id = ?2 AND is_deleted = 0"
                ),
                params![id.as_str(), business_id],
                Self::parse_sale,
            )
            .optional()?;
        Self::with_items(uow, sale)
    }

    fn find_by_order(&self, uow: &UnitOfWork<'_>, order_id: &OrderId) -> Result<Option<Sale>> {
        let sale = uow
            .connection()
            .query_row(
                &format!("SELECT {SALE_COLUMNS} FROM sales WHERE order_id = ?1"),
                params![order_id.as_str()],
                Self::parse_sale,
            )
            .optional()?;
        Self::with_items(uow, sale)
    }

    fn update_settlement(&self, uow: &UnitOfWork<'_>, sale: &Sale) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE sales SET amount_paid = ?1, balance_due = ?2
             WHERE id = ?3 AND business_id = ?4 AND is_deleted = 0",
            params![
                sale.amount_paid,
                sale.balance_due,
                sale.id.as_str(),
                sale.business_id
            ],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("sale {}", sale.id)));
        }
        Ok(())
    }

    fn delete(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &SaleId) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE sales SET is_deleted = 1
             WHERE id = ?1 AND business_id = ?2 AND is_deleted = 0",
            params![id.as_str(), business_id],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("sale {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::CustomerId;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn sample_sale(order_id: Option<OrderId>) -> Sale {
        let items = vec![
            SaleItem::new("v-1", 8, 6).unwrap(),
            SaleItem::new("v-2", 1, 2).unwrap(),
        ];
        let total = Sale::total_of(&items).unwrap();
        Sale {
            id: SaleId::new(),
            business_id: "biz-1".to_string(),
            customer_id: CustomerId::new(),
            seller_id: "seller-1".to_string(),
            order_id,
            sale_date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            total_amount: total,
            amount_paid: 0,
            balance_due: total,
            items,
            created_at: 1_000,
            is_deleted: false,
        }
    }

    #[test]
    fn test_insert_and_get_with_items() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteSaleRepository;
        let uow = db.begin().unwrap();

        let sale = sample_sale(None);
        repo.insert(&uow, &sale).unwrap();

        let loaded = repo.get(&uow, "biz-1", &sale.id).unwrap().unwrap();
        assert_eq!(loaded, sale);
        assert_eq!(loaded.total_amount, 50);
    }

    #[test]
    fn test_one_sale_per_order() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteSaleRepository;
        let uow = db.begin().unwrap();

        let order_id = OrderId::new();
        let sale = sample_sale(Some(order_id));
        repo.insert(&uow, &sale).unwrap();
        assert!(repo.insert(&uow, &sample_sale(Some(order_id))).is_err());

        let found = repo.find_by_order(&uow, &order_id).unwrap().unwrap();
        assert_eq!(found.id, sale.id);
    }

    #[test]
    fn test_settlement_and_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteSaleRepository;
        let uow = db.begin().unwrap();

        let mut sale = sample_sale(None);
        repo.insert(&uow, &sale).unwrap();
        sale.settle(20).unwrap();
        repo.update_settlement(&uow, &sale).unwrap();

        let loaded = repo.get(&uow, "biz-1", &sale.id).unwrap().unwrap();
        assert_eq!((loaded.amount_paid, loaded.balance_due), (20, 30));

        repo.delete(&uow, "biz-1", &sale.id).unwrap();
        assert!(repo.get(&uow, "biz-1", &sale.id).unwrap().is_none());
    }
}
