use std::io;

use routesale_core::client::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] routesale_core::Error),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid {kind} id '{value}'")]
    InvalidId { kind: &'static str, value: String },
    #[error("Invalid timestamp '{0}', expected RFC 3339")]
    InvalidTimestamp(String),
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("No input provided")]
    EmptyInput,
    #[error("Configuration error: {0}")]
    Config(String),
}
