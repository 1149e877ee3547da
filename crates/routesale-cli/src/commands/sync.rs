use std::path::Path;

use routesale_core::db::Repositories;
use routesale_core::sync::{BatchResponse, ChangesResponse, RawOperation};
use routesale_core::{ChangeFeed, SyncBatchProcessor};

use crate::commands::common::{parse_json, parse_since, read_input, Session};
use crate::error::CliError;

pub fn push_batch(session: &Session, raw: &str) -> Result<BatchResponse, CliError> {
    let ctx = session.context()?;
    let operations: Vec<RawOperation> = parse_json(raw)?;
    let processor = SyncBatchProcessor::new(
        Repositories::sqlite(),
        session.clock(),
        session.config.sync.clone(),
    );

    let mut db = session.open_database()?;
    Ok(processor.process_batch(&mut db, &ctx, operations)?)
}

pub fn fetch_changes(
    session: &Session,
    since: Option<&str>,
    limit: Option<usize>,
) -> Result<ChangesResponse, CliError> {
    let ctx = session.context()?;
    let since = parse_since(since)?;
    let feed = ChangeFeed::new(
        Repositories::sqlite().sync_operations,
        session.config.sync.clone(),
    );

    let mut db = session.open_database()?;
    Ok(feed.get_changes(&mut db, &ctx, since, limit)?)
}

pub fn run_sync_push(session: &Session, file: Option<&Path>) -> Result<(), CliError> {
    let raw = read_input(file)?;
    let response = push_batch(session, &raw)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn run_sync_changes(
    session: &Session,
    since: Option<&str>,
    limit: Option<usize>,
) -> Result<(), CliError> {
    let response = fetch_changes(session, since, limit)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
