//! Server configuration: command line, environment, and catalogue seed file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use clap::{ArgAction, Parser};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::ledger::LedgerConfig;
use crate::state::{StateError, Store};
use crate::types::{BoosterDefinition, TaskDefinition, Timestamp};

/// Command line and environment configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "minepoints-server", version, about = "Mining points ledger and webhook reconciler")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "MINEPOINTS_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Database directory (default: platform data dir)
    #[arg(long, env = "MINEPOINTS_DATA_DIR", value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Shared secret for webhook signatures
    #[arg(long, env = "MINEPOINTS_WEBHOOK_SECRET", hide_env_values = true)]
    pub webhook_secret: Option<String>,

    /// Secret for session tokens
    #[arg(long, env = "MINEPOINTS_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    /// Reject unsigned webhooks. Disable only in development.
    #[arg(long, env = "MINEPOINTS_REQUIRE_SIGNATURES", default_value_t = true, action = ArgAction::Set)]
    pub require_signatures: bool,

    /// Upper bound on handling one request
    #[arg(long, env = "MINEPOINTS_REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,

    /// When the points-to-token conversion runs (RFC 3339)
    #[arg(long, env = "MINEPOINTS_CONVERSION_AT", value_name = "INSTANT")]
    pub conversion_at: Option<String>,

    /// End of the presale early-bird window (RFC 3339)
    #[arg(long, env = "MINEPOINTS_EARLY_BIRD_UNTIL", value_name = "INSTANT")]
    pub early_bird_until: Option<String>,

    /// Seconds between auto-claim sweeps
    #[arg(long, env = "MINEPOINTS_SWEEP_INTERVAL_SECS", default_value_t = 60)]
    pub sweep_interval_secs: u64,

    /// Offset from UTC, in minutes, at which daily tasks reset
    #[arg(long, env = "MINEPOINTS_DAILY_RESET_OFFSET_MINUTES", default_value_t = 0, allow_negative_numbers = true)]
    pub daily_reset_offset_minutes: i32,

    /// JSON file with task and booster definitions to load at startup
    #[arg(long, env = "MINEPOINTS_CATALOG", value_name = "PATH")]
    pub catalog: Option<PathBuf>,
}

impl Config {
    /// Check cross-field constraints
    ///
    /// # Errors
    /// Returns error if a required secret is missing or a value is malformed
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secret.trim().is_empty() {
            return Err(ConfigError::MissingSecret("session secret"));
        }
        if self.require_signatures && self.webhook_secret().is_empty() {
            return Err(ConfigError::MissingSecret("webhook secret"));
        }
        if self.request_timeout_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("intervals must be positive".into()));
        }
        self.conversion_instant()?;
        self.ledger_config()?;
        Ok(())
    }

    /// Webhook secret, empty if unset
    #[must_use]
    pub fn webhook_secret(&self) -> &str {
        self.webhook_secret.as_deref().unwrap_or_default().trim()
    }

    /// Database directory
    #[must_use]
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("minepoints")
                .join("ledger")
        })
    }

    /// Request timeout
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Auto-claim sweep period
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Scheduled conversion instant
    ///
    /// # Errors
    /// Returns error if the value is not RFC 3339
    pub fn conversion_instant(&self) -> Result<Option<Timestamp>, ConfigError> {
        self.conversion_at
            .as_deref()
            .map(|s| parse_instant("conversion-at", s))
            .transpose()
    }

    /// Ledger tunables, defaults plus configured overrides
    ///
    /// # Errors
    /// Returns error if an override is malformed
    pub fn ledger_config(&self) -> Result<LedgerConfig, ConfigError> {
        let offset = self
            .daily_reset_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or(ConfigError::InvalidOffset(self.daily_reset_offset_minutes))?;
        let early_bird = self
            .early_bird_until
            .as_deref()
            .map(|s| parse_instant("early-bird-until", s))
            .transpose()?;

        Ok(LedgerConfig {
            daily_reset_offset: offset,
            presale_early_bird_until: early_bird,
            ..LedgerConfig::default()
        })
    }
}

fn parse_instant(field: &'static str, value: &str) -> Result<Timestamp, ConfigError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| ConfigError::InvalidInstant {
            field,
            value: value.to_string(),
        })
}

/// Tasks and boosters to load at startup
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    /// Task definitions
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,
    /// Booster definitions
    #[serde(default)]
    pub boosters: Vec<BoosterDefinition>,
}

impl Catalog {
    /// Read a catalogue file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| ConfigError::Catalog {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Upsert every definition into `store`
    ///
    /// # Errors
    /// Returns error on an unusable id or storage failure
    pub fn seed(&self, store: &Store) -> Result<(), StateError> {
        for task in &self.tasks {
            store.upsert_task(task)?;
        }
        for booster in &self.boosters {
            store.upsert_booster(booster)?;
        }
        info!(
            tasks = self.tasks.len(),
            boosters = self.boosters.len(),
            "catalog seeded"
        );
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required secret not provided
    #[error("missing {0}")]
    MissingSecret(&'static str),
    /// Timestamp not RFC 3339
    #[error("invalid {field}: {value:?} is not an RFC 3339 instant")]
    InvalidInstant {
        /// Option name
        field: &'static str,
        /// Value given
        value: String,
    },
    /// Offset outside ±24h
    #[error("invalid daily reset offset: {0} minutes")]
    InvalidOffset(i32),
    /// Other out-of-range value
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Catalogue unreadable
    #[error("catalog {path:?}: {reason}")]
    Catalog {
        /// File path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },
}
