//! Explicit transaction handle passed to every repository call.

use rusqlite::{Connection, Transaction};

use crate::error::Result;

/// A unit of work groups repository writes so they commit or roll back
/// together. Dropping it without calling [`UnitOfWork::commit`] rolls back.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> UnitOfWork<'conn> {
    pub(crate) const fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    /// Connection bound to this transaction.
    pub fn connection(&self) -> &Connection {
        &self.tx
    }

    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}
