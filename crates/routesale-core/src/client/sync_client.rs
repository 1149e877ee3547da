//! Drains the local queue against the server and follows the change feed.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::ClientSettings;
use crate::db::{ClientStateRepository, SqliteClientStore};
use crate::error::ErrorDisposition;
use crate::models::{EntityKind, QueuedOperation, SyncAction};
use crate::sync::{Change, OperationResult, RawOperation};
use crate::util::is_temp_id;

use super::id_map::IdMap;
use super::queue::OperationQueue;
use super::transport::{SyncTransport, TransportError};

const CURSOR_KEY: &str = "change_feed_cursor";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// Outcome of one pass over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Operations sent to the server
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Failures the server will keep refusing until the operation is
    /// corrected; also counted in `failed`
    pub rejected: usize,
    /// Held back behind an earlier failure on the same entity
    pub skipped: usize,
}

impl From<&QueuedOperation> for RawOperation {
    fn from(operation: &QueuedOperation) -> Self {
        Self {
            operation_id: Some(operation.id.clone()),
            entity: Some(operation.entity.as_str().to_string()),
            action: Some(operation.action.as_str().to_string()),
            entity_id: Some(operation.entity_id.clone()),
            payload: operation.payload.clone(),
            client_timestamp: Some(Value::String(operation.client_timestamp.to_rfc3339())),
        }
    }
}

pub struct SyncClient<T> {
    queue: OperationQueue,
    ids: IdMap,
    transport: T,
    settings: ClientSettings,
}

impl<T: SyncTransport> SyncClient<T> {
    pub fn new(queue: OperationQueue, ids: IdMap, transport: T, settings: ClientSettings) -> Self {
        Self {
            queue,
            ids,
            transport,
            settings,
        }
    }

    pub const fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    /// Push every queued operation once, in batches.
    ///
    /// After a failure, later operations on the same entity wait for the
    /// next pass. A transport error stops the pass and is returned; every
    /// operation of the batch in flight is counted as a failed attempt.
    pub async fn sync(&self) -> Result<SyncReport, SyncError> {
        let batch_size = self.settings.batch_size.max(1);
        let mut report = SyncReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut held: HashSet<(EntityKind, String)> = HashSet::new();

        loop {
            let mut batch = Vec::with_capacity(batch_size);
            for operation in self.queue.pending(None).await? {
                if !seen.insert(operation.id.clone()) {
                    continue;
                }
                if held.contains(&(operation.entity, operation.entity_id.clone())) {
                    report.skipped += 1;
                    continue;
                }
                batch.push(operation);
                if batch.len() == batch_size {
                    break;
                }
            }
            if batch.is_empty() {
                break;
            }

            report.attempted += batch.len();
            let raw = batch.iter().map(RawOperation::from).collect();
            let response = match self.transport.push(raw).await {
                Ok(response) => response,
                Err(error) => {
                    tracing::warn!(%error, operations = batch.len(), "Sync push failed");
                    let message = error.to_string();
                    for operation in &batch {
                        self.queue.mark_error(&operation.id, &message).await?;
                    }
                    return Err(error.into());
                }
            };

            let mut results: HashMap<String, OperationResult> = response
                .results
                .into_iter()
                .map(|result| (result.operation_id.clone(), result))
                .collect();

            for operation in &batch {
                match results.remove(&operation.id) {
                    Some(result) if result.success => {
                        self.reconcile(operation, &result).await?;
                        report.succeeded += 1;
                    }
                    Some(result) => {
                        let message = match (&result.code, &result.error) {
                            (Some(code), Some(error)) => format!("{code}: {error}"),
                            (_, Some(error)) => error.clone(),
                            _ => "operation failed".to_string(),
                        };
                        self.fail(operation, &message, &mut held).await?;
                        report.failed += 1;
                        let disposition = result
                            .code
                            .as_deref()
                            .map_or(ErrorDisposition::RetryLater, ErrorDisposition::for_code);
                        if disposition != ErrorDisposition::RetryLater {
                            tracing::warn!(
                                operation_id = %operation.id,
                                ?disposition,
                                "Operation needs correction before it can sync"
                            );
                            report.rejected += 1;
                        }
                    }
                    None => {
                        self.fail(operation, "no result returned", &mut held).await?;
                        report.failed += 1;
                    }
                }
            }
        }

        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            rejected = report.rejected,
            skipped = report.skipped,
            "Sync pass finished"
        );
        Ok(report)
    }

    async fn reconcile(
        &self,
        operation: &QueuedOperation,
        result: &OperationResult,
    ) -> Result<(), SyncError> {
        self.queue.mark_synced(&operation.id).await?;

        let Some(server_id) = result.entity_id.as_deref() else {
            return Ok(());
        };
        if operation.action == SyncAction::Insert
            && is_temp_id(&operation.entity_id)
            && server_id != operation.entity_id
        {
            self.ids
                .record(operation.entity, &operation.entity_id, server_id)
                .await?;
            let rewritten = self
                .queue
                .rewrite_entity_id(operation.entity, &operation.entity_id, server_id)
                .await?;
            tracing::debug!(
                entity = %operation.entity,
                temp_id = %operation.entity_id,
                server_id,
                rewritten,
                "Reconciled temporary id"
            );
        }
        Ok(())
    }

    async fn fail(
        &self,
        operation: &QueuedOperation,
        message: &str,
        held: &mut HashSet<(EntityKind, String)>,
    ) -> Result<(), SyncError> {
        tracing::warn!(operation_id = %operation.id, error = message, "Operation rejected");
        self.queue.mark_error(&operation.id, message).await?;
        held.insert((operation.entity, operation.entity_id.clone()));
        Ok(())
    }

    /// Follow the change feed from the stored cursor until it is exhausted.
    pub async fn pull(&self) -> Result<Vec<Change>, SyncError> {
        let limit = self.settings.batch_size.max(1);
        let mut since = self.cursor().await?;
        let mut changes = Vec::new();

        loop {
            let page = self.transport.pull(since, limit).await?;
            let count = page.changes.len();
            changes.extend(page.changes);
            if let Some(next) = page.next_since.filter(|next| Some(*next) != since) {
                self.store_cursor(next).await?;
                since = Some(next);
            }
            if count < limit {
                break;
            }
        }

        tracing::info!(count = changes.len(), "Pulled remote changes");
        Ok(changes)
    }

    async fn cursor(&self) -> Result<Option<DateTime<Utc>>, SyncError> {
        let db = self.queue.database();
        let mut db = db.lock().await;
        let uow = db.read()?;
        let stored = ClientStateRepository::get(&SqliteClientStore, &uow, CURSOR_KEY)?;
        Ok(stored
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc)))
    }

    async fn store_cursor(&self, at: DateTime<Utc>) -> Result<(), SyncError> {
        let db = self.queue.database();
        let mut db = db.lock().await;
        let uow = db.begin()?;
        SqliteClientStore.set(&uow, CURSOR_KEY, &at.to_rfc3339())?;
        uow.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    use crate::client::InProcessTransport;
    use crate::config::SyncSettings;
    use crate::context::{AuthContext, Role};
    use crate::db::{Database, Repositories, SqliteSyncOperationRepository};
    use crate::models::NewOperation;
    use crate::sync::{
        BatchResponse, BatchSummary, ChangeFeed, ChangesResponse, SyncBatchProcessor,
    };
    use crate::time::SystemTimeSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn transport() -> InProcessTransport {
        let server = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let settings = SyncSettings::default();
        InProcessTransport::new(
            server,
            SyncBatchProcessor::new(
                Repositories::sqlite(),
                Arc::new(SystemTimeSource),
                settings.clone(),
            ),
            ChangeFeed::new(Arc::new(SqliteSyncOperationRepository), settings),
            AuthContext::new("biz-1", "seller-1", Role::Seller).unwrap(),
        )
    }

    fn client<T: SyncTransport>(transport: T, batch_size: usize) -> SyncClient<T> {
        let local = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let clock = Arc::new(SystemTimeSource);
        SyncClient::new(
            OperationQueue::new(local.clone(), clock.clone()),
            IdMap::new(local, clock),
            transport,
            ClientSettings { batch_size },
        )
    }

    fn op(entity: EntityKind, action: SyncAction, entity_id: &str, payload: Value) -> NewOperation {
        NewOperation {
            entity,
            action,
            entity_id: entity_id.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn drains_the_queue_and_reconciles_temp_ids() {
        let client = client(transport(), 2);
        let queue = client.queue();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Insert,
                "tmp_c1",
                json!({"name": "Corner Store"}),
            ))
            .await
            .unwrap();
        queue
            .enqueue(op(
                EntityKind::Sales,
                SyncAction::Insert,
                "tmp_s1",
                json!({
                    "customerId": "tmp_c1",
                    "items": [{"variantId": "v-1", "quantity": 2, "unitPrice": 15}]
                }),
            ))
            .await
            .unwrap();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Update,
                "tmp_c1",
                json!({"phone": "555-0100"}),
            ))
            .await
            .unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                attempted: 3,
                succeeded: 3,
                failed: 0,
                rejected: 0,
                skipped: 0
            }
        );
        assert!(queue.is_empty().await.unwrap());

        let server_id = client
            .ids
            .resolve(EntityKind::Customers, "tmp_c1")
            .await
            .unwrap()
            .unwrap();
        assert!(!is_temp_id(&server_id));

        let again = client.sync().await.unwrap();
        assert_eq!(again, SyncReport::default());
    }

    #[tokio::test]
    async fn failures_hold_back_the_same_entity() {
        let client = client(transport(), 1);
        let queue = client.queue();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Update,
                "tmp_missing",
                json!({"phone": "1"}),
            ))
            .await
            .unwrap();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Update,
                "tmp_missing",
                json!({"phone": "2"}),
            ))
            .await
            .unwrap();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Insert,
                "tmp_other",
                json!({"name": "Kiosk"}),
            ))
            .await
            .unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!(
            report,
            SyncReport {
                attempted: 2,
                succeeded: 1,
                failed: 1,
                rejected: 1,
                skipped: 1
            }
        );

        let remaining = queue.pending(None).await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].attempts, 1);
        assert!(remaining[0]
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("NOT_FOUND"));
        assert_eq!(remaining[1].attempts, 0);
    }

    #[tokio::test]
    async fn rejected_update_is_retargeted_at_the_server_id() {
        let client = client(transport(), 10);
        let queue = client.queue();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Insert,
                "tmp_c1",
                json!({"name": "Corner Store"}),
            ))
            .await
            .unwrap();
        queue
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Update,
                "tmp_c1",
                json!({"nickname": "?"}),
            ))
            .await
            .unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!((report.succeeded, report.failed), (1, 1));
        assert_eq!(report.rejected, 1);

        let server_id = client
            .ids
            .resolve(EntityKind::Customers, "tmp_c1")
            .await
            .unwrap()
            .unwrap();
        let remaining = queue.pending(None).await.unwrap();
        assert_eq!(remaining[0].entity_id, server_id);
    }

    struct Busy;

    impl SyncTransport for Busy {
        async fn push(&self, batch: Vec<RawOperation>) -> Result<BatchResponse, TransportError> {
            let results: Vec<OperationResult> = batch
                .into_iter()
                .map(|raw| OperationResult {
                    operation_id: raw.operation_id.unwrap_or_default(),
                    success: false,
                    error: Some("still running".to_string()),
                    code: Some("IN_PROGRESS".to_string()),
                    entity_id: None,
                    server_timestamp: Utc::now(),
                })
                .collect();
            Ok(BatchResponse {
                summary: BatchSummary::of(&results),
                results,
            })
        }

        async fn pull(
            &self,
            since: Option<DateTime<Utc>>,
            _limit: usize,
        ) -> Result<ChangesResponse, TransportError> {
            Ok(ChangesResponse {
                changes: Vec::new(),
                next_since: since,
            })
        }
    }

    #[tokio::test]
    async fn transient_failures_are_not_rejections() {
        let client = client(Busy, 10);
        client
            .queue()
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Insert,
                "tmp_c1",
                json!({"name": "Corner Store"}),
            ))
            .await
            .unwrap();

        let report = client.sync().await.unwrap();
        assert_eq!((report.failed, report.rejected), (1, 0));
        let remaining = client.queue().pending(None).await.unwrap();
        assert!(remaining[0]
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("IN_PROGRESS"));
    }

    struct Offline;

    impl SyncTransport for Offline {
        async fn push(&self, _batch: Vec<RawOperation>) -> Result<BatchResponse, TransportError> {
            Err(TransportError::Unavailable("no network".to_string()))
        }

        async fn pull(
            &self,
            _since: Option<DateTime<Utc>>,
            _limit: usize,
        ) -> Result<ChangesResponse, TransportError> {
            Err(TransportError::Unavailable("no network".to_string()))
        }
    }

    #[tokio::test]
    async fn transport_errors_count_as_attempts() {
        let client = client(Offline, 10);
        let queued = client
            .queue()
            .enqueue(op(
                EntityKind::Customers,
                SyncAction::Insert,
                "tmp_c1",
                json!({"name": "Corner Store"}),
            ))
            .await
            .unwrap();

        let error = client.sync().await.unwrap_err();
        assert!(matches!(error, SyncError::Transport(TransportError::Unavailable(_))));
        let stored = client.queue().get(&queued.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    #[tokio::test]
    async fn pull_resumes_from_the_stored_cursor() {
        let client = client(transport(), 2);
        for index in 0..3 {
            client
                .queue()
                .enqueue(op(
                    EntityKind::Customers,
                    SyncAction::Insert,
                    &format!("tmp_{index}"),
                    json!({"name": format!("Customer {index}")}),
                ))
                .await
                .unwrap();
        }
        client.sync().await.unwrap();

        let changes = client.pull().await.unwrap();
        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|change| !is_temp_id(&change.entity_id)));

        assert!(client.pull().await.unwrap().is_empty());
    }
}
