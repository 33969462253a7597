//! Runtime configuration read from the environment
//!
//! Every section has `DEFAULT_*` constants and a `from_env` constructor.
//! A `.env` file in the working directory is honored.

use std::time::Duration;

use arxiv_common::{EtlError, EtlResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::DbConfig;
use crate::harvest::checkpoint::DEFAULT_CHECKPOINT_KEY;
use crate::lock::DEFAULT_LOCK_KEY;
use crate::storage::StorageConfig;

pub const DEFAULT_OAI_BASE_URL: &str = "http://export.arxiv.org/oai2";
pub const DEFAULT_METADATA_PREFIX: &str = "arXiv";
pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 11.0;
/// Lowest pause accepted from the environment; the endpoint rate limits clients
pub const MIN_REQUEST_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_USER_AGENT: &str = concat!("arxiv-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OaiConfig {
    pub base_url: String,
    pub metadata_prefix: String,
    /// Restrict harvesting to one set, e.g. `cs`
    pub set: Option<String>,
    /// Pause between two requests of the same listing
    pub request_delay_secs: f64,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for OaiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OAI_BASE_URL.to_string(),
            metadata_prefix: DEFAULT_METADATA_PREFIX.to_string(),
            set: None,
            request_delay_secs: DEFAULT_REQUEST_DELAY_SECS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl OaiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            base_url: std::env::var("OAI_BASE_URL").unwrap_or(defaults.base_url),
            metadata_prefix: std::env::var("OAI_METADATA_PREFIX")
                .unwrap_or(defaults.metadata_prefix),
            set: std::env::var("OAI_SET").ok().filter(|s| !s.is_empty()),
            request_delay_secs: std::env::var("OAI_REQUEST_DELAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_delay_secs),
            timeout_secs: std::env::var("OAI_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_secs),
            user_agent: std::env::var("OAI_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs.max(0.0))
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.base_url.is_empty() {
            return Err(EtlError::Config("OAI_BASE_URL cannot be empty".to_string()));
        }
        if self.metadata_prefix.is_empty() {
            return Err(EtlError::Config(
                "OAI_METADATA_PREFIX cannot be empty".to_string(),
            ));
        }
        if !self.request_delay_secs.is_finite()
            || self.request_delay_secs < MIN_REQUEST_DELAY_SECS
        {
            return Err(EtlError::Config(format!(
                "OAI_REQUEST_DELAY_SECS must be at least {MIN_REQUEST_DELAY_SECS}, got {}",
                self.request_delay_secs
            )));
        }
        if self.timeout_secs == 0 {
            return Err(EtlError::Config(
                "OAI_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub checkpoint_key: String,
    pub lock_key: String,
    /// Stands in for the checkpoint before the first day completes
    pub initial_checkpoint: Option<NaiveDate>,
    /// Stop after this many harvested days; unbounded when `None`
    pub max_days: Option<u32>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            checkpoint_key: DEFAULT_CHECKPOINT_KEY.to_string(),
            lock_key: DEFAULT_LOCK_KEY.to_string(),
            initial_checkpoint: None,
            max_days: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> EtlResult<Self> {
        let defaults = Self::default();

        let initial_checkpoint = match std::env::var("HARVEST_INITIAL_CHECKPOINT") {
            Ok(value) if !value.trim().is_empty() => Some(
                NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|e| {
                    EtlError::Config(format!(
                        "HARVEST_INITIAL_CHECKPOINT '{value}' is not YYYY-MM-DD: {e}"
                    ))
                })?,
            ),
            _ => None,
        };

        Ok(Self {
            checkpoint_key: std::env::var("CHECKPOINT_KEY").unwrap_or(defaults.checkpoint_key),
            lock_key: std::env::var("LOCK_KEY").unwrap_or(defaults.lock_key),
            initial_checkpoint,
            max_days: std::env::var("HARVEST_MAX_DAYS")
                .ok()
                .and_then(|s| s.parse().ok()),
        })
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.checkpoint_key.is_empty() || self.lock_key.is_empty() {
            return Err(EtlError::Config(
                "CHECKPOINT_KEY and LOCK_KEY cannot be empty".to_string(),
            ));
        }
        if self.checkpoint_key == self.lock_key {
            return Err(EtlError::Config(format!(
                "CHECKPOINT_KEY and LOCK_KEY must differ, both are '{}'",
                self.lock_key
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub oai: OaiConfig,
    pub storage: StorageConfig,
    pub database: DbConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    pub fn load() -> EtlResult<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            oai: OaiConfig::from_env(),
            storage: StorageConfig::from_env(),
            database: DbConfig::from_env(),
            pipeline: PipelineConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> EtlResult<()> {
        self.oai.validate()?;
        self.storage.validate().map_err(EtlError::Config)?;
        self.database.validate()?;
        self.pipeline.validate()?;
        Ok(())
    }
}
