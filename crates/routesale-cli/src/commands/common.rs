use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use routesale_core::db::Database;
use routesale_core::models::{Order, OrderEvent, QueuedOperation};
use routesale_core::orders::VersionGuard;
use routesale_core::{AuthContext, EngineConfig, Role, SystemTimeSource, TimeSource};
use serde::de::DeserializeOwned;

use crate::cli::GuardArgs;
use crate::error::CliError;

/// Resolved global options shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub db_path: PathBuf,
    pub config: EngineConfig,
    business: Option<String>,
    user: Option<String>,
    role: Option<String>,
}

impl Session {
    pub fn new(
        db_path: PathBuf,
        config: EngineConfig,
        business: Option<String>,
        user: Option<String>,
        role: Option<String>,
    ) -> Self {
        Self {
            db_path,
            config,
            business,
            user,
            role,
        }
    }

    /// Build a session from CLI flags, falling back to `ROUTESALE_*` variables.
    pub fn resolve(
        cli_db_path: Option<PathBuf>,
        cli_config_path: Option<PathBuf>,
        business: Option<String>,
        user: Option<String>,
        role: Option<String>,
    ) -> Result<Self, CliError> {
        let config = EngineConfig::load(&resolve_config_path(cli_config_path))?;
        Ok(Self::new(
            resolve_db_path(cli_db_path),
            config,
            business.or_else(|| env::var("ROUTESALE_BUSINESS_ID").ok()),
            user.or_else(|| env::var("ROUTESALE_USER_ID").ok()),
            role.or_else(|| env::var("ROUTESALE_ROLE").ok()),
        ))
    }

    /// The caller identity; business and user are required.
    pub fn context(&self) -> Result<AuthContext, CliError> {
        let business = self.business.as_deref().ok_or_else(|| {
            CliError::Config("no business given; pass --business or set ROUTESALE_BUSINESS_ID".into())
        })?;
        let user = self.user.as_deref().ok_or_else(|| {
            CliError::Config("no user given; pass --user or set ROUTESALE_USER_ID".into())
        })?;
        let role = match self.role.as_deref() {
            Some(role) => Role::from_str(role)?,
            None => Role::default(),
        };
        Ok(AuthContext::new(business, user, role)?)
    }

    pub fn open_database(&self) -> Result<Database, CliError> {
        open_database(&self.db_path, &self.config)
    }

    pub fn clock(&self) -> Arc<dyn TimeSource> {
        Arc::new(SystemTimeSource)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("ROUTESALE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("routesale")
        .join("routesale.db")
}

pub fn resolve_config_path(cli_config_path: Option<PathBuf>) -> PathBuf {
    cli_config_path
        .or_else(|| env::var_os("ROUTESALE_CONFIG").map(PathBuf::from))
        .unwrap_or_else(default_config_path)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("routesale")
        .join("config.json")
}

pub fn open_database(path: &Path, config: &EngineConfig) -> Result<Database, CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(path, &config.database)?)
}

/// Read a JSON document from `path`, or from piped stdin when no path is given.
pub fn read_input(path: Option<&Path>) -> Result<String, CliError> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path)?,
        None => read_piped_stdin()?.ok_or(CliError::EmptyInput)?,
    };
    if raw.trim().is_empty() {
        return Err(CliError::EmptyInput);
    }
    Ok(raw)
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut input = String::new();
    stdin.read_to_string(&mut input)?;
    Ok(Some(input))
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, CliError> {
    Ok(serde_json::from_str(raw)?)
}

pub fn parse_id<T: FromStr>(kind: &'static str, value: &str) -> Result<T, CliError> {
    value.trim().parse().map_err(|_| CliError::InvalidId {
        kind,
        value: value.to_string(),
    })
}

pub fn parse_since(value: Option<&str>) -> Result<Option<DateTime<Utc>>, CliError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|_| CliError::InvalidTimestamp(raw.to_string()))
        })
        .transpose()
}

pub fn parse_date(value: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDate(value.to_string()))
}

pub fn version_guard(args: &GuardArgs) -> VersionGuard {
    let guard = VersionGuard::at(args.base_version);
    match args.event_id.as_deref() {
        Some(key) => guard.with_event_id(key),
        None => guard,
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(|| timestamp_ms.to_string(), |at| at.to_rfc3339())
}

pub fn format_order_lines(orders: &[Order]) -> Vec<String> {
    orders
        .iter()
        .map(|order| {
            format!(
                "{}  {:<9}  v{}  {}  {:>8}  {} item(s)",
                order.id,
                order.status.to_string(),
                order.version,
                order.delivery_date,
                order.total_amount,
                order.items.len()
            )
        })
        .collect()
}

pub fn format_event_lines(events: &[OrderEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            format!(
                "v{}  {:<14}  {}  by {}",
                event.version,
                event.event_type.to_string(),
                format_timestamp(event.created_at),
                event.actor_id
            )
        })
        .collect()
}

pub fn format_queue_lines(operations: &[QueuedOperation]) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let mut line = format!(
                "#{}  {} {} {}  attempts {}",
                operation.seq,
                operation.action,
                operation.entity,
                operation.entity_id,
                operation.attempts
            );
            if let Some(error) = &operation.last_error {
                line.push_str("  last error: ");
                line.push_str(error);
            }
            line
        })
        .collect()
}
