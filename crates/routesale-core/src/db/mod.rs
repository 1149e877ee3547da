//! Database layer for routesale

mod client_repository;
mod columns;
mod connection;
mod customer_repository;
mod distribution_repository;
mod id_mapping_repository;
mod migrations;
mod order_event_repository;
mod order_repository;
mod payment_repository;
mod sale_repository;
mod sync_repository;
mod unit_of_work;

use std::sync::Arc;

pub use client_repository::{
    ClientIdMapRepository, ClientQueueRepository, ClientStateRepository, SqliteClientStore,
};
pub use connection::Database;
pub use customer_repository::{CustomerRepository, SqliteCustomerRepository};
pub use distribution_repository::{DistributionRepository, SqliteDistributionRepository};
pub use id_mapping_repository::{IdMappingRepository, SqliteIdMappingRepository};
pub use order_event_repository::{OrderEventRepository, SqliteOrderEventRepository};
pub use order_repository::{OrderFilter, OrderRepository, SqliteOrderRepository};
pub use payment_repository::{PaymentRepository, SqlitePaymentRepository};
pub use sale_repository::{SaleRepository, SqliteSaleRepository};
pub use sync_repository::{SqliteSyncOperationRepository, SyncOperationRepository};
pub use unit_of_work::UnitOfWork;

/// Server-side repository set injected into the sync processor and the
/// order lifecycle manager.
#[derive(Clone)]
pub struct Repositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub sales: Arc<dyn SaleRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub distributions: Arc<dyn DistributionRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub order_events: Arc<dyn OrderEventRepository>,
    pub sync_operations: Arc<dyn SyncOperationRepository>,
    pub id_mappings: Arc<dyn IdMappingRepository>,
}

impl Repositories {
    /// The `SQLite` implementations of every repository
    #[must_use]
    pub fn sqlite() -> Self {
        Self {
            customers: Arc::new(SqliteCustomerRepository),
            sales: Arc::new(SqliteSaleRepository),
            payments: Arc::new(SqlitePaymentRepository),
            distributions: Arc::new(SqliteDistributionRepository),
            orders: Arc::new(SqliteOrderRepository),
            order_events: Arc::new(SqliteOrderEventRepository),
            sync_operations: Arc::new(SqliteSyncOperationRepository),
            id_mappings: Arc::new(SqliteIdMappingRepository),
        }
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
