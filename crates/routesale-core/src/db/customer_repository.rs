//! Customer repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Customer, CustomerId};

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for customer storage operations
pub trait CustomerRepository: Send + Sync {
    fn insert(&self, uow: &UnitOfWork<'_>, customer: &Customer) -> Result<()>;

    /// Get a live (not deleted) customer of a business
    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &CustomerId,
    ) -> Result<Option<Customer>>;

    fn update(&self, uow: &UnitOfWork<'_>, customer: &Customer) -> Result<()>;

    /// Soft delete a customer
    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &CustomerId,
        now_ms: i64,
    ) -> Result<()>;
}

/// `SQLite` implementation of `CustomerRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteCustomerRepository;

impl SqliteCustomerRepository {
    fn parse_customer(row: &rusqlite::Row<'_>) -> rusqlite::Result<Customer> {
        Ok(Customer {
            id: columns::text(row, 0)?,
            business_id: row.get(1)?,
            name: row.get(2)?,
            phone: row.get(3)?,
            address: row.get(4)?,
            notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
            is_deleted: columns::flag(row, 8)?,
        })
    }
}

impl CustomerRepository for SqliteCustomerRepository {
    fn insert(&self, uow: &UnitOfWork<'_>, customer: &Customer) -> Result<()> {
        uow.connection().execute(
            "INSERT INTO customers
                (id, business_id, name, phone, address, notes, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                customer.id.as_str(),
                customer.business_id,
                customer.name,
                customer.phone,
                customer.address,
                customer.notes,
                customer.created_at,
                customer.updated_at,
                i32::from(customer.is_deleted)
            ],
        )?;
        Ok(())
    }

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &CustomerId,
    ) -> Result<Option<Customer>> {
        let customer = uow
            .connection()
            .query_row(
                "SELECT id, business_id, name, phone, address, notes, created_at, updated_at, is_deleted
                 FROM customers WHERE id = ?1 AND business_id = ?2 AND is_deleted = 0",
                params![id.as_str(), business_id],
                Self::parse_customer,
            )
            .optional()?;
        Ok(customer)
    }

    fn update(&self, uow: &UnitOfWork<'_>, customer: &Customer) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE customers
             SET name = ?1, phone = ?2, address = ?3, notes = ?4, updated_at = ?5
             WHERE id = ?6 AND business_id = ?7 AND is_deleted = 0",
            params![
                customer.name,
                customer.phone,
                customer.address,
                customer.notes,
                customer.updated_at,
                customer.id.as_str(),
                customer.business_id
            ],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("customer {}", customer.id)));
        }
        Ok(())
    }

    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &CustomerId,
        now_ms: i64,
    ) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE customers SET is_deleted = 1, updated_at = ?1
             WHERE id = ?2 AND business_id = ?3 AND is_deleted = 0",
            params![now_ms, id.as_str(), business_id],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("customer {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[test]
    fn test_insert_get_update_delete() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqliteCustomerRepository;
        let uow = db.begin().unwrap();

        let mut customer = Customer::new(CustomerId::new(), "biz-1", "Corner Store", 1_000);
        repo.insert(&uow, &customer).unwrap();

        let loaded = repo.get(&uow, "biz-1", &customer.id).unwrap().unwrap();
        assert_eq!(loaded, customer);
        assert!(repo.get(&uow, "biz-2", &customer.id).unwrap().is_none());

        customer.phone = Some("555-0100".to_string());
        customer.updated_at = 2_000;
        repo.update(&uow, &customer).unwrap();
        let loaded = repo.get(&uow, "biz-1", &customer.id).unwrap().unwrap();
        assert_eq!(loaded.phone.as_deref(), Some("555-0100"));

        repo.delete(&uow, "biz-1", &customer.id, 3_000).unwrap();
        assert!(repo.get(&uow, "biz-1", &customer.id).unwrap().is_none());
        assert!(matches!(
            repo.delete(&uow, "biz-1", &customer.id, 4_000),
            Err(Error::NotFound(_))
        ));
    }
}
