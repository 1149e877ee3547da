use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use routesale_core::client::{
    new_temp_id, IdMap, InProcessTransport, OperationQueue, SyncClient, SyncReport,
};
use routesale_core::db::{Database, Repositories};
use routesale_core::models::{EntityKind, NewOperation, QueuedOperation, SyncAction};
use routesale_core::{ChangeFeed, SyncBatchProcessor};
use tokio::sync::Mutex;

use crate::commands::common::{format_queue_lines, parse_json, read_input, Session};
use crate::error::CliError;

/// Outcome of `queue flush`
#[derive(Debug, serde::Serialize)]
pub struct FlushSummary {
    #[serde(flatten)]
    pub report: SyncReport,
    pub pulled: usize,
    pub remaining: usize,
}

pub fn open_queue(session: &Session) -> Result<OperationQueue, CliError> {
    let db = Arc::new(Mutex::new(session.open_database()?));
    Ok(OperationQueue::new(db, session.clock()))
}

pub async fn enqueue_operation(
    queue: &OperationQueue,
    entity: &str,
    action: &str,
    entity_id: Option<String>,
    payload: serde_json::Value,
) -> Result<QueuedOperation, CliError> {
    let operation = NewOperation {
        entity: EntityKind::from_str(entity)?,
        action: SyncAction::from_str(action)?,
        entity_id: entity_id.unwrap_or_else(new_temp_id),
        payload,
    };
    Ok(queue.enqueue(operation).await?)
}

/// Push the whole queue to the local server tables, then optionally pull.
pub async fn flush_queue(
    session: &Session,
    queue: OperationQueue,
    pull: bool,
) -> Result<FlushSummary, CliError> {
    let ctx = session.context()?;
    let db: Arc<Mutex<Database>> = queue.database();
    let clock = session.clock();
    let repos = Repositories::sqlite();
    let transport = InProcessTransport::new(
        db.clone(),
        SyncBatchProcessor::new(repos.clone(), clock.clone(), session.config.sync.clone()),
        ChangeFeed::new(repos.sync_operations, session.config.sync.clone()),
        ctx,
    );
    let client = SyncClient::new(
        queue,
        IdMap::new(db, clock),
        transport,
        session.config.client.clone(),
    );

    let report = client.sync().await?;
    let pulled = if pull { client.pull().await?.len() } else { 0 };
    let remaining = client.queue().len().await?;
    Ok(FlushSummary {
        report,
        pulled,
        remaining,
    })
}

pub async fn run_queue_list(session: &Session, failed: bool, as_json: bool) -> Result<(), CliError> {
    let queue = open_queue(session)?;
    let operations = if failed {
        queue.failed().await?
    } else {
        queue.pending(None).await?
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&operations)?);
        return Ok(());
    }

    if operations.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&operations) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_queue_enqueue(
    session: &Session,
    entity: &str,
    action: &str,
    entity_id: Option<String>,
    file: Option<&Path>,
) -> Result<(), CliError> {
    let payload = parse_json(&read_input(file)?)?;
    let queue = open_queue(session)?;
    let operation = enqueue_operation(&queue, entity, action, entity_id, payload).await?;
    println!("{}", serde_json::to_string_pretty(&operation)?);
    Ok(())
}

pub async fn run_queue_flush(session: &Session, pull: bool) -> Result<(), CliError> {
    let queue = open_queue(session)?;
    let summary = flush_queue(session, queue, pull).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub async fn run_queue_clear(session: &Session) -> Result<(), CliError> {
    let removed = open_queue(session)?.clear().await?;
    println!("Removed {removed} queued operation(s)");
    Ok(())
}
