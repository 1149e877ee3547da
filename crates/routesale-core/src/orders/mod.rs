//! Order lifecycle: draft → confirmed → delivered, with cancellation,
//! optimistic concurrency and an append-only event log.

mod commands;
mod delivery;
mod manager;
mod validation;

pub use commands::{
    CreateOrder, DeliveredItem, Delivery, NewOrderItem, OrderPatch, VersionGuard,
};
pub use manager::OrderLifecycleManager;
