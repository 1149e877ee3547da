//! Server side of the offline sync protocol: idempotent batch processing
//! and the change feed devices pull from.

mod feed;
mod operation;
mod payload;
mod processor;
mod wire;

pub use feed::ChangeFeed;
pub use operation::SyncOperation;
pub use payload::{
    CustomerFields, CustomerPatch, DistributionFields, DistributionPatch, Mutation,
    PaymentFields, PaymentPatch, SaleFields, SaleItemFields,
};
pub use processor::SyncBatchProcessor;
pub use wire::{BatchResponse, BatchSummary, Change, ChangesResponse, OperationResult, RawOperation};
