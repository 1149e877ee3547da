//! Order aggregate repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT/OFFSET

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Order, OrderId, OrderItem, OrderStatus};
use crate::util::format_date;

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Optional criteria for listing orders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub seller_id: Option<String>,
    pub delivery_date: Option<NaiveDate>,
}

/// Trait for order aggregate storage operations
pub trait OrderRepository: Send + Sync {
    /// Insert a new order header together with its items
    fn insert(&self, uow: &UnitOfWork<'_>, order: &Order) -> Result<()>;

    /// Load an order with its items, scoped to a business
    fn get(&self, uow: &UnitOfWork<'_>, business_id: &str, id: &OrderId)
        -> Result<Option<Order>>;

    /// List orders, newest first
    fn list(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        filter: &OrderFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>>;

    /// Write the header only if the stored version still equals `base_version`.
    ///
    /// Fails with `Conflict` when another writer got there first.
    fn update_if_version(&self, uow: &UnitOfWork<'_>, order: &Order, base_version: i64)
        -> Result<()>;

    /// Replace the whole item set of an order
    fn replace_items(&self, uow: &UnitOfWork<'_>, order: &Order) -> Result<()>;
}

/// `SQLite` implementation of `OrderRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteOrderRepository;

const ORDER_COLUMNS: &str = "id, business_id, customer_id, seller_id, delivery_date, status, \
    payment_intent, total_amount, notes, version, confirmed_snapshot, delivered_snapshot, \
    sale_id, created_by, created_at, updated_at";

impl SqliteOrderRepository {
    fn parse_order(row: &rusqlite::Row<'_>) -> rusqlite::Result<Order> {
        Ok(Order {
            id: columns::text(row, 0)?,
            business_id: row.get(1)?,
            customer_id: columns::text(row, 2)?,
            seller_id: row.get(3)?,
            delivery_date: columns::date(row, 4)?,
            status: columns::text(row, 5)?,
            payment_intent: columns::text(row, 6)?,
            total_amount: row.get(7)?,
            notes: row.get(8)?,
            version: row.get(9)?,
            confirmed_snapshot: columns::optional_json(row, 10)?,
            delivered_snapshot: columns::optional_json(row, 11)?,
            sale_id: columns::optional_text(row, 12)?,
            created_by: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
            items: Vec::new(),
        })
    }

    fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<OrderItem> {
        Ok(OrderItem {
            id: columns::text(row, 0)?,
            variant_id: row.get(1)?,
            quantity: row.get(2)?,
            delivered_quantity: row.get(3)?,
            unit_price: row.get(4)?,
            final_unit_price: row.get(5)?,
            is_modified: columns::flag(row, 6)?,
            original_quantity: row.get(7)?,
        })
    }

    fn load_items(uow: &UnitOfWork<'_>, order_id: &OrderId) -> Result<Vec<OrderItem>> {
        let mut stmt = uow.connection().prepare(
            "SELECT id, variant_id, quantity, delivered_quantity, unit_price,
                    final_unit_price, is_modified, original_quantity
             FROM order_items WHERE order_id = ?1 ORDER BY position",
        )?;
        let items = stmt
            .query_map(params![order_id.as_str()], Self::parse_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn insert_items(uow: &UnitOfWork<'_>, order: &Order) -> Result<()> {
        let mut stmt = uow.connection().prepare(
            "INSERT INTO order_items
                (id, order_id, position, variant_id, quantity, delivered_quantity,
                 unit_price, final_unit_price, is_modified, original_quantity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for (position, item) in order.items.iter().enumerate() {
            stmt.execute(params![
                item.id.as_str(),
                order.id.as_str(),
                position as i64,
                item.variant_id,
                item.quantity,
                item.delivered_quantity,
                item.unit_price,
                item.final_unit_price,
                i32::from(item.is_modified),
                item.original_quantity
            ])?;
        }
        Ok(())
    }

    fn snapshot_json(order: &Order) -> Result<(Option<String>, Option<String>)> {
        let confirmed = order
            .confirmed_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let delivered = order
            .delivered_snapshot
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        Ok((confirmed, delivered))
    }
}

impl OrderRepository for SqliteOrderRepository {
    fn insert(&self, uow: &UnitOfWork<'_>, order: &Order) -> Result<()> {
        let (confirmed, delivered) = Self::snapshot_json(order)?;
        uow.connection().execute(
            &format!(
                "INSERT INTO orders ({ORDER_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                order.id.as_str(),
                order.business_id,
                order.customer_id.as_str(),
                order.seller_id,
                format_date(order.delivery_date),
                order.status.as_str(),
                order.payment_intent.as_str(),
                order.total_amount,
                order.notes,
                order.version,
                confirmed,
                delivered,
                order.sale_id.map(|id| id.as_str()),
                order.created_by,
                order.created_at,
                order.updated_at
            ],
        )?;
        Self::insert_items(uow, order)
    }

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &OrderId,
    ) -> Result<Option<Order>> {
        let order = uow
            .connection()
            .query_row(
                &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1 AND business_id = ?2"),
                params![id.as_str(), business_id],
                Self::parse_order,
            )
            .optional()?;

        match order {
            Some(mut order) => {
                order.items = Self::load_items(uow, &order.id)?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    fn list(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        filter: &OrderFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Order>> {
        let mut stmt = uow.connection().prepare(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE business_id = ?1
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR seller_id = ?3)
               AND (?4 IS NULL OR delivery_date = ?4)
             ORDER BY created_at DESC, id DESC
             LIMIT ?5 OFFSET ?6"
        ))?;

        let mut orders = stmt
            .query_map(
                params![
                    business_id,
                    filter.status.map(OrderStatus::as_str),
                    filter.seller_id,
                    filter.delivery_date.map(format_date),
                    limit as i64,
                    offset as i64
                ],
                Self::parse_order,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for order in &mut orders {
            order.items = Self::load_items(uow, &order.id)?;
        }
        Ok(orders)
    }

    fn update_if_version(
        &self,
        uow: &UnitOfWork<'_>,
        order: &Order,
        base_version: i64,
    ) -> Result<()> {
        let (confirmed, delivered) = Self::snapshot_json(order)?;
        let conn = uow.connection();
        let rows = conn.execute(
            "UPDATE orders
             SET customer_id = ?1, seller_id = ?2, delivery_date = ?3, status = ?4,
                 payment_intent = ?5, total_amount = ?6, notes = ?7, version = ?8,
                 confirmed_snapshot = ?9, delivered_snapshot = ?10, sale_id = ?11,
                 updated_at = ?12
             WHERE id = ?13 AND business_id = ?14 AND version = ?15",
            params![
                order.customer_id.as_str(),
                order.seller_id,
                format_date(order.delivery_date),
                order.status.as_str(),
                order.payment_intent.as_str(),
                order.total_amount,
                order.notes,
                order.version,
                confirmed,
                delivered,
                order.sale_id.map(|id| id.as_str()),
                order.updated_at,
                order.id.as_str(),
                order.business_id,
                base_version
            ],
        )?;

        if rows == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT version FROM orders WHERE id = ?1 AND business_id = ?2",
                    params![order.id.as_str(), order.business_id],
                    |row| row.get(0),
                )
                .optional()?;
            return Err(match actual {
                Some(actual) => Error::Conflict {
                    expected: base_version,
                    actual,
                },
                None => Error::not_found(format!("order {}", order.id)),
            });
        }
        Ok(())
    }

    fn replace_items(&self, uow: &UnitOfWork<'_>, order: &Order) -> Result<()> {
        uow.connection().execute(
            "DELETE FROM order_items WHERE order_id = ?1",
            params![order.id.as_str()],
        )?;
        Self::insert_items(uow, order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{CustomerId, PaymentIntent};
    use pretty_assertions::assert_eq;

    fn sample_order(seller: &str, created_at: i64) -> Order {
        let mut order = Order {
            id: OrderId::new(),
            business_id: "biz-1".to_string(),
            customer_id: CustomerId::new(),
            seller_id: seller.to_string(),
            delivery_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            status: OrderStatus::Draft,
            payment_intent: PaymentIntent::Credit,
            total_amount: 0,
            notes: Some("leave at the back door".to_string()),
            version: 1,
            confirmed_snapshot: None,
            delivered_snapshot: None,
            sale_id: None,
            created_by: "user-1".to_string(),
            created_at,
            updated_at: created_at,
            items: vec![OrderItem::new("v-1", 5, 10), OrderItem::new("v-2", 2, 3)],
        };
        order.recalculate_total().unwrap();
        order
    }

    #[test]
    fn test_insert_and_get() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteOrderRepository;
        let uow = db.begin().unwrap();

        let order = sample_order("seller-1", 1_000);
        repo.insert(&uow, &order).unwrap();

        let loaded = repo.get(&uow, "biz-1", &order.id).unwrap().unwrap();
        assert_eq!(loaded, order);
        assert_eq!(loaded.total_amount, 56);
        assert!(repo.get(&uow, "biz-2", &order.id).unwrap().is_none());
    }

    #[test]
    fn test_update_if_version() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteOrderRepository;
        let uow = db.begin().unwrap();

        let mut order = sample_order("seller-1", 1_000);
        repo.insert(&uow, &order).unwrap();

        order.version = 2;
        order.status = OrderStatus::Confirmed;
        order.confirmed_snapshot = Some(order.snapshot(2_000));
        repo.update_if_version(&uow, &order, 1).unwrap();

        let loaded = repo.get(&uow, "biz-1", &order.id).unwrap().unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.confirmed_snapshot, order.confirmed_snapshot);

        // Stale writer
        let error = repo.update_if_version(&uow, &order, 1).unwrap_err();
        assert!(matches!(
            error,
            Error::Conflict {
                expected: 1,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_replace_items_keeps_order() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteOrderRepository;
        let uow = db.begin().unwrap();

        let mut order = sample_order("seller-1", 1_000);
        repo.insert(&uow, &order).unwrap();

        order.items = vec![
            OrderItem::new("v-9", 1, 1),
            OrderItem::new("v-8", 2, 2),
            OrderItem::new("v-7", 3, 3),
        ];
        repo.replace_items(&uow, &order).unwrap();

        let loaded = repo.get(&uow, "biz-1", &order.id).unwrap().unwrap();
        let variants: Vec<_> = loaded.items.iter().map(|i| i.variant_id.as_str()).collect();
        assert_eq!(variants, vec!["v-9", "v-8", "v-7"]);
    }

    #[test]
    fn test_list_with_filter() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteOrderRepository;
        let uow = db.begin().unwrap();

        let first = sample_order("seller-1", 1_000);
        let second = sample_order("seller-2", 2_000);
        repo.insert(&uow, &first).unwrap();
        repo.insert(&uow, &second).unwrap();

        let all = repo
            .list(&uow, "biz-1", &OrderFilter::default(), 10, 0)
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id); // Newest first

        let filter = OrderFilter {
            seller_id: Some("seller-1".to_string()),
            ..OrderFilter::default()
        };
        let by_seller = repo.list(&uow, "biz-1", &filter, 10, 0).unwrap();
        assert_eq!(by_seller.len(), 1);
        assert_eq!(by_seller[0].id, first.id);

        let filter = OrderFilter {
            status: Some(OrderStatus::Confirmed),
            ..OrderFilter::default()
        };
        assert!(repo.list(&uow, "biz-1", &filter, 10, 0).unwrap().is_empty());

        let page = repo
            .list(&uow, "biz-1", &OrderFilter::default(), 1, 1)
            .unwrap();
        assert_eq!(page[0].id, first.id);
    }
}
