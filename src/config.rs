//! Cleaning configuration.
//!
//! Supplied per call, either built in code or loaded from YAML:
//!
//! ```yaml
//! strategy: truncate
//! restart_identity: true
//! skip_tables: [countries]
//! timeout: 30s
//! ```

use crate::error::CleanError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// How table data is cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// `DELETE FROM` each table in dependency order (default)
    #[default]
    #[serde(alias = "deletion")]
    Delete,
    /// Bulk-clear each table, optionally restarting identity counters
    #[serde(alias = "truncation")]
    Truncate,
    /// Roll back a transaction wrapped around the test
    Transaction,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "delete" | "deletion" => Ok(Strategy::Delete),
            "truncate" | "truncation" => Ok(Strategy::Truncate),
            "transaction" => Ok(Strategy::Transaction),
            _ => Err(format!(
                "Unknown strategy: {}. Valid options: delete, truncate, transaction",
                s
            )),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Delete => write!(f, "delete"),
            Strategy::Truncate => write!(f, "truncate"),
            Strategy::Transaction => write!(f, "transaction"),
        }
    }
}

/// Options for one clean call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanConfig {
    #[serde(alias = "type")]
    pub strategy: Strategy,

    /// Tables never cleared
    #[serde(alias = "skipTables")]
    pub skip_tables: Vec<String>,

    /// Clear only these tables
    #[serde(alias = "onlyTables")]
    pub only_tables: Vec<String>,

    /// Reset sequences/auto-increment counters (truncate only)
    #[serde(alias = "restartIdentity")]
    pub restart_identity: bool,

    /// Use the backend's cascading truncate (truncate only)
    pub cascade: bool,

    /// Restrict introspection to one schema/namespace
    pub schema: Option<String>,

    /// Bookkeeping tables to leave alone, on top of the built-in list
    #[serde(alias = "protectedTables")]
    pub protected_tables: Vec<String>,

    /// Give up (reporting `Cancelled`) once this much time has passed
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl CleanConfig {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Parse a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CleanError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(yaml).map_err(|e| CleanError::config(e.to_string()))
    }

    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, CleanError> {
        let content = fs::read_to_string(path).map_err(|e| {
            CleanError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check option combinations that make no sense regardless of backend
    pub fn validate(&self) -> Result<(), CleanError> {
        if !self.skip_tables.is_empty() && !self.only_tables.is_empty() {
            return Err(CleanError::config(
                "skip_tables and only_tables are mutually exclusive",
            ));
        }
        if self.strategy != Strategy::Truncate {
            if self.restart_identity {
                return Err(CleanError::config(format!(
                    "restart_identity applies to the truncate strategy, not {}",
                    self.strategy
                )));
            }
            if self.cascade {
                return Err(CleanError::config(format!(
                    "cascade applies to the truncate strategy, not {}",
                    self.strategy
                )));
            }
        }
        if let Some(name) = self
            .skip_tables
            .iter()
            .chain(&self.only_tables)
            .chain(&self.protected_tables)
            .find(|t| t.trim().is_empty())
        {
            return Err(CleanError::config(format!("empty table name {:?}", name)));
        }
        if self.schema.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(CleanError::config("schema must not be empty"));
        }
        Ok(())
    }
}
