//! Payment repository implementation

use rusqlite::{params, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{Payment, PaymentId};

use super::columns;
use super::unit_of_work::UnitOfWork;

/// Trait for payment storage operations
pub trait PaymentRepository: Send + Sync {
    fn insert(&self, uow: &UnitOfWork<'_>, payment: &Payment) -> Result<()>;

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &PaymentId,
    ) -> Result<Option<Payment>>;

    fn update(&self, uow: &UnitOfWork<'_>, payment: &Payment) -> Result<()>;

    /// Soft delete a payment
    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &PaymentId,
        now_ms: i64,
    ) -> Result<()>;
}

/// `SQLite` implementation of `PaymentRepository`
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlitePaymentRepository;

impl SqlitePaymentRepository {
    fn parse_payment(row: &rusqlite::Row<'_>) -> rusqlite::Result<Payment> {
        Ok(Payment {
            id: columns::text(row, 0)?,
            business_id: row.get(1)?,
            sale_id: columns::text(row, 2)?,
            customer_id: columns::optional_text(row, 3)?,
            amount: row.get(4)?,
            method: columns::text(row, 5)?,
            reference: row.get(6)?,
            paid_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            is_deleted: columns::flag(row, 10)?,
        })
    }
}

impl PaymentRepository for SqlitePaymentRepository {
    fn insert(&self, uow: &UnitOfWork<'_>, payment: &Payment) -> Result<()> {
        uow.connection().execute(
            "INSERT INTO payments
                (id, business_id, sale_id, customer_id, amount, method, reference,
                 paid_at, created_at, updated_at, is_deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                payment.id.as_str(),
                payment.business_id,
                payment.sale_id.as_str(),
                payment.customer_id.map(|id| id.as_str()),
                payment.amount,
                payment.method.as_str(),
                payment.reference,
                payment.paid_at,
                payment.created_at,
                payment.updated_at,
                i32::from(payment.is_deleted)
            ],
        )?;
        Ok(())
    }

    fn get(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &PaymentId,
    ) -> Result<Option<Payment>> {
        let payment = uow
            .connection()
            .query_row(
                "SELECT id, business_id, sale_id, customer_id, amount, method, reference,
                        paid_at, created_at, updated_at, is_deleted
                 FROM payments WHERE id = ?1 AND business_id = ?2 AND is_deleted = 0",
                params![id.as_str(), business_id],
                Self::parse_payment,
            )
            .optional()?;
        Ok(payment)
    }

    fn update(&self, uow: &UnitOfWork<'_>, payment: &Payment) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE payments
             SET amount = ?1, method = ?2, reference = ?3, paid_at = ?4, updated_at = ?5
             WHERE id = ?6 AND business_id = ?7 AND is_deleted = 0",
            params![
                payment.amount,
                payment.method.as_str(),
                payment.reference,
                payment.paid_at,
                payment.updated_at,
                payment.id.as_str(),
                payment.business_id
            ],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("payment {}", payment.id)));
        }
        Ok(())
    }

    fn delete(
        &self,
        uow: &UnitOfWork<'_>,
        business_id: &str,
        id: &PaymentId,
        now_ms: i64,
    ) -> Result<()> {
        let rows = uow.connection().execute(
            "UPDATE payments SET is_deleted = 1, updated_at = ?1
             WHERE id = ?2 AND business_id = ?3 AND is_deleted = 0",
            params![now_ms, id.as_str(), business_id],
        )?;

        if rows == 0 {
            return Err(Error::not_found(format!("payment {id}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{PaymentMethod, SaleId};

    #[test]
    fn test_payment_round_trip() {
        let mut db = Database::open_in_memory().unwrap();
        let repo = SqlitePaymentRepository;
        let uow = db.begin().unwrap();

        let mut payment = Payment {
            id: PaymentId::new(),
            business_id: "biz-1".to_string(),
            sale_id: SaleId::new(),
            customer_id: None,
            amount: 25,
            method: PaymentMethod::Transfer,
            reference: Some("REF-1".to_string()),
            paid_at: 1_000,
            created_at: 1_000,
            updated_at: 1_000,
            is_deleted: false,
        };
        repo.insert(&uow, &payment).unwrap();
        assert_eq!(
            repo.get(&uow, "biz-1", &payment.id).unwrap().unwrap(),
            payment
        );

        payment.amount = 30;
        payment.method = PaymentMethod::Cash;
        repo.update(&uow, &payment).unwrap();
        let loaded = repo.get(&uow, "biz-1", &payment.id).unwrap().unwrap();
        assert_eq!((loaded.amount, loaded.method), (30, PaymentMethod::Cash));

        repo.delete(&uow, "biz-1", &payment.id, 2_000).unwrap();
        assert!(repo.get(&uow, "biz-1", &payment.id).unwrap().is_none());
    }
}
