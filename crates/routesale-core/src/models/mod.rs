//! Data models for routesale

mod customer;
mod distribution;
mod ids;
mod order;
mod order_event;
mod payment;
mod queued_operation;
mod sale;
mod sync;

pub use customer::Customer;
pub use distribution::Distribution;
pub use ids::{
    CustomerId, DistributionId, OrderEventId, OrderId, OrderItemId, PaymentId, SaleId,
};
pub use order::{Order, OrderItem, OrderSnapshot, OrderStatus, PaymentIntent};
pub use order_event::{OrderEvent, OrderEventType};
pub use payment::{Payment, PaymentMethod};
pub use queued_operation::{NewOperation, QueuedOperation};
pub use sale::{Sale, SaleItem};
pub use sync::{EntityKind, SyncAction, SyncOperationRecord, SyncStatus};
