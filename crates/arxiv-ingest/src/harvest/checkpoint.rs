//! Last fully harvested day, persisted as a one-line object

use std::sync::Arc;

use arxiv_common::{EtlError, EtlResult};
use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use crate::storage::ObjectStore;

pub const DEFAULT_CHECKPOINT_KEY: &str = "last_batch_date.txt";

#[derive(Clone)]
pub struct Checkpoint {
    store: Arc<dyn ObjectStore>,
    key: String,
    initial: Option<NaiveDate>,
}

impl Checkpoint {
    /// `initial` stands in for the stored date until the first day completes.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        initial: Option<NaiveDate>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            initial,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The stored date, if the checkpoint object exists
    pub async fn read(&self) -> EtlResult<Option<NaiveDate>> {
        let Some(data) = self.store.get(&self.key).await? else {
            return Ok(None);
        };

        let content = String::from_utf8_lossy(&data);
        let line = content.lines().next().unwrap_or_default().trim();
        let date = NaiveDate::parse_from_str(line, "%Y-%m-%d").map_err(|e| {
            EtlError::Config(format!(
                "checkpoint {} holds '{}', expected YYYY-MM-DD: {}",
                self.key, line, e
            ))
        })?;

        Ok(Some(date))
    }

    /// The stored date, falling back to the configured initial date
    pub async fn current(&self) -> EtlResult<NaiveDate> {
        match self.read().await? {
            Some(date) => Ok(date),
            None => self.initial.ok_or_else(|| {
                EtlError::Config(format!(
                    "checkpoint {} does not exist and HARVEST_INITIAL_CHECKPOINT is not set",
                    self.key
                ))
            }),
        }
    }

    pub async fn write(&self, date: NaiveDate) -> EtlResult<()> {
        self.store
            .put(&self.key, date.format("%Y-%m-%d").to_string().into_bytes())
            .await?;
        info!(key = %self.key, date = %date, "Checkpoint advanced");
        Ok(())
    }

    /// The day after the checkpoint, unless that day is `today` or later.
    pub async fn next_day(&self, today: NaiveDate) -> EtlResult<Option<NaiveDate>> {
        let last = self.current().await?;
        let next = last
            .checked_add_days(Days::new(1))
            .filter(|next| *next < today);

        debug!(last = %last, next = ?next, "Computed next harvest day");
        Ok(next)
    }
}
