//! How the sync client reaches the server.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::context::AuthContext;
use crate::db::Database;
use crate::sync::{BatchResponse, ChangeFeed, ChangesResponse, RawOperation, SyncBatchProcessor};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Server unreachable: {0}")]
    Unavailable(String),

    /// The server refused the whole request
    #[error("Request rejected ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<crate::Error> for TransportError {
    fn from(error: crate::Error) -> Self {
        Self::Rejected {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Push/pull channel to the sync endpoint.
#[allow(async_fn_in_trait)]
pub trait SyncTransport {
    /// Submit one batch of operations
    async fn push(&self, batch: Vec<RawOperation>) -> Result<BatchResponse, TransportError>;

    /// Fetch one change feed page
    async fn pull(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<ChangesResponse, TransportError>;
}

/// Calls the server components directly, for local use and tests.
pub struct InProcessTransport {
    db: Arc<Mutex<Database>>,
    processor: SyncBatchProcessor,
    feed: ChangeFeed,
    ctx: AuthContext,
}

impl InProcessTransport {
    pub fn new(
        db: Arc<Mutex<Database>>,
        processor: SyncBatchProcessor,
        feed: ChangeFeed,
        ctx: AuthContext,
    ) -> Self {
        Self {
            db,
            processor,
            feed,
            ctx,
        }
    }
}

impl SyncTransport for InProcessTransport {
    async fn push(&self, batch: Vec<RawOperation>) -> Result<BatchResponse, TransportError> {
        let mut db = self.db.lock().await;
        Ok(self.processor.process_batch(&mut db, &self.ctx, batch)?)
    }

    async fn pull(
        &self,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<ChangesResponse, TransportError> {
        let mut db = self.db.lock().await;
        Ok(self.feed.get_changes(&mut db, &self.ctx, since, Some(limit))?)
    }
}
