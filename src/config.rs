//! Configuration for the deal board.
//!
//! Read from `deal-board.toml` (or the file named by `DEAL_BOARD_CONFIG`),
//! then overridden by environment variables, then by CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! database_path = "deals.db"
//! bind_addr = "0.0.0.0:3000"
//! log_json = false
//!
//! [query]
//! stale_secs = 300
//! cache_secs = 600
//! retry = 1
//! retry_delay_ms = 1000
//!
//! [session]
//! name = "Ann"
//! email = "ann@example.com"
//!
//! [[board.columns]]
//! id = "todo"
//! name = "Incoming"
//!
//! [[board.columns]]
//! id = "produced"
//! name = "Produced"
//! ```

use crate::board::{BoardTemplate, ColumnTemplate};
use crate::query::QueryConfig;
use crate::state::User;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "deal-board.toml";
pub const ENV_CONFIG: &str = "DEAL_BOARD_CONFIG";
pub const ENV_DATABASE: &str = "DEAL_BOARD_DB";
pub const ENV_BIND: &str = "DEAL_BOARD_BIND";
pub const ENV_LOG_JSON: &str = "DEAL_BOARD_LOG_JSON";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    /// Emit JSON log lines instead of human-readable ones
    pub log_json: bool,
    pub query: QuerySettings,
    pub board: BoardSettings,
    pub session: Option<SessionSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("deals.db"),
            bind_addr: "0.0.0.0:3000".to_string(),
            log_json: false,
            query: QuerySettings::default(),
            board: BoardSettings::default(),
            session: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySettings {
    pub stale_secs: u64,
    pub cache_secs: u64,
    pub retry: u32,
    pub retry_delay_ms: u64,
}

impl Default for QuerySettings {
    fn default() -> Self {
        let defaults = QueryConfig::default();
        Self {
            stale_secs: defaults.stale_time.as_secs(),
            cache_secs: defaults.cache_time.as_secs(),
            retry: defaults.retry,
            retry_delay_ms: defaults.retry_delay.as_millis() as u64,
        }
    }
}

impl QuerySettings {
    pub fn to_query_config(&self) -> QueryConfig {
        QueryConfig {
            stale_time: Duration::from_secs(self.stale_secs),
            cache_time: Duration::from_secs(self.cache_secs),
            retry: self.retry,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

/// Column list overriding the built-in template; empty means built-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub columns: Vec<ColumnTemplate>,
}

impl BoardSettings {
    pub fn template(&self) -> Result<BoardTemplate> {
        if self.columns.is_empty() {
            return Ok(BoardTemplate::default());
        }
        BoardTemplate::new(self.columns.clone()).context("Invalid [board] columns in config")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl SessionSettings {
    pub fn to_user(&self) -> User {
        User {
            email: self.email.clone(),
            name: self.name.clone(),
            status: true,
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `DEAL_BOARD_CONFIG`, then
    /// `./deal-board.toml` if present, then defaults. Environment overrides
    /// are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => std::env::var_os(ENV_CONFIG)
                .map(PathBuf::from)
                .or_else(|| {
                    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                    local.exists().then_some(local)
                }),
        };

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("no config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        // Fail early on a bad template rather than at first fetch
        config.board.template()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(addr) = lookup(ENV_BIND).filter(|v| !v.is_empty()) {
            self.bind_addr = addr;
        }
        if let Some(flag) = lookup(ENV_LOG_JSON) {
            self.log_json = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
    }

    pub fn template(&self) -> Result<BoardTemplate> {
        self.board.template()
    }

    pub fn query_config(&self) -> QueryConfig {
        self.query.to_query_config()
    }
}
