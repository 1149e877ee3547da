//! Engine configuration.
//!
//! A JSON file provides the base values (missing file means defaults) and
//! `ROUTESALE_*` environment variables override individual settings.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const DEFAULT_MAX_BATCH_SIZE: usize = 500;
const DEFAULT_STALE_PENDING_SECS: u64 = 300;
const DEFAULT_FEED_LIMIT: usize = 100;
const DEFAULT_FEED_MAX_LIMIT: usize = 500;
const DEFAULT_CLIENT_BATCH_SIZE: usize = 50;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Top-level configuration shared by server and client components.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Server-side batch processor and change feed settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct SyncSettings {
    /// Largest batch accepted in one call
    pub max_batch_size: usize,
    /// Age after which a `pending` record is considered abandoned
    pub stale_pending_secs: u64,
    pub feed_default_limit: usize,
    pub feed_max_limit: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            stale_pending_secs: DEFAULT_STALE_PENDING_SECS,
            feed_default_limit: DEFAULT_FEED_LIMIT,
            feed_max_limit: DEFAULT_FEED_MAX_LIMIT,
        }
    }
}

impl SyncSettings {
    pub const fn stale_pending_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_secs)
    }

    /// Clamp a requested feed page size into the allowed range.
    pub fn clamp_feed_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.feed_default_limit)
            .clamp(1, self.feed_max_limit.max(1))
    }
}

/// Device-side sync client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ClientSettings {
    /// Operations submitted per push
    pub batch_size: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_CLIENT_BATCH_SIZE,
        }
    }
}

/// `SQLite` connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct DatabaseSettings {
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseSettings {
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl EngineConfig {
    /// Parse configuration from a raw JSON payload.
    pub fn parse(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file; a missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
            .map_err(|error| Error::Config(format!("{}: {error}", path.display())))
    }

    /// Load from file, then apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_lookup(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply `ROUTESALE_*` overrides from an arbitrary lookup.
    pub fn apply_lookup(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = parse_var(&lookup, "ROUTESALE_MAX_BATCH_SIZE")? {
            self.sync.max_batch_size = value;
        }
        if let Some(value) = parse_var(&lookup, "ROUTESALE_STALE_PENDING_SECS")? {
            self.sync.stale_pending_secs = value;
        }
        if let Some(value) = parse_var(&lookup, "ROUTESALE_FEED_DEFAULT_LIMIT")? {
            self.sync.feed_default_limit = value;
        }
        if let Some(value) = parse_var(&lookup, "ROUTESALE_FEED_MAX_LIMIT")? {
            self.sync.feed_max_limit = value;
        }
        if let Some(value) = parse_var(&lookup, "ROUTESALE_CLIENT_BATCH_SIZE")? {
            self.client.batch_size = value;
        }
        if let Some(value) = parse_var(&lookup, "ROUTESALE_BUSY_TIMEOUT_MS")? {
            self.database.busy_timeout_ms = value;
        }
        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if self.sync.max_batch_size == 0 {
            return Err(Error::Config("sync.max_batch_size must be positive".into()));
        }
        if self.sync.feed_max_limit == 0 {
            return Err(Error::Config("sync.feed_max_limit must be positive".into()));
        }
        if self.client.batch_size == 0 {
            return Err(Error::Config("client.batch_size must be positive".into()));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>> {
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_apply_to_empty_document() {
        let config = EngineConfig::parse("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.sync.max_batch_size, 500);
        assert_eq!(config.client.batch_size, 50);
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let error = EngineConfig::parse(r#"{ "sync": { "max_batch": 5 } }"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config =
            EngineConfig::parse(r#"{ "sync": { "max_batch_size": 20 } }"#).unwrap();
        let vars: HashMap<&str, &str> = [
            ("ROUTESALE_MAX_BATCH_SIZE", "40"),
            ("ROUTESALE_CLIENT_BATCH_SIZE", " 7 "),
        ]
        .into_iter()
        .collect();

        config
            .apply_lookup(|name| vars.get(name).map(|value| (*value).to_string()))
            .unwrap();
        assert_eq!(config.sync.max_batch_size, 40);
        assert_eq!(config.client.batch_size, 7);
    }

    #[test]
    fn invalid_override_is_reported() {
        let mut config = EngineConfig::default();
        let error = config
            .apply_lookup(|name| (name == "ROUTESALE_FEED_MAX_LIMIT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(error.to_string().contains("ROUTESALE_FEED_MAX_LIMIT"));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(EngineConfig::parse(r#"{ "client": { "batch_size": 0 } }"#).is_err());
    }

    #[test]
    fn feed_limit_is_clamped() {
        let settings = SyncSettings::default();
        assert_eq!(settings.clamp_feed_limit(None), 100);
        assert_eq!(settings.clamp_feed_limit(Some(0)), 1);
        assert_eq!(settings.clamp_feed_limit(Some(10_000)), 500);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
