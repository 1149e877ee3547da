//! routesale-core - Core library for routesale
//!
//! This crate contains the offline mutation sync protocol (device queue,
//! idempotent server batch processor, change feed), the order lifecycle
//! manager, and the `SQLite` repositories both run on.

pub mod client;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod orders;
pub mod sync;
pub mod time;
pub mod util;

pub use config::EngineConfig;
pub use context::{AuthContext, Role};
pub use error::{Error, ErrorDisposition, Result};
pub use orders::OrderLifecycleManager;
pub use sync::{ChangeFeed, SyncBatchProcessor};
pub use time::{SystemTimeSource, TimeSource};
