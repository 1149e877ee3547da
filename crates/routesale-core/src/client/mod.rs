//! Device side of the sync protocol: the durable queue, the id map and the
//! client that pushes the queue and pulls the change feed.

mod id_map;
mod queue;
mod sync_client;
mod transport;

pub use id_map::IdMap;
pub use queue::{new_temp_id, OperationQueue};
pub use sync_client::{SyncClient, SyncError, SyncReport};
pub use transport::{InProcessTransport, SyncTransport, TransportError};
