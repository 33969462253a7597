//! Day-by-day harvesting of the OAI-PMH ListRecords listing
//!
//! One day is fetched page by page along the resumption token chain. Each
//! page is normalized and staged before the next request goes out, and the
//! checkpoint only moves once the last page of the day is staged. A failure
//! part way through leaves the earlier pages staged; they are simply
//! overwritten when the day is harvested again.

pub mod checkpoint;

use std::sync::Arc;
use std::time::Duration;

use arxiv_common::EtlResult;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::config::OaiConfig;
use crate::normalize::normalize_page;
use crate::oai::{ListRecordsRequest, OaiClient};
use crate::staging::{page_suffix, write_page};
use crate::storage::ObjectStore;

pub use checkpoint::Checkpoint;

/// Counters for one harvested day
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DayStats {
    pub date: Option<NaiveDate>,
    pub pages: usize,
    pub records: usize,
    pub articles: usize,
    pub deletions: usize,
    pub files_written: usize,
}

/// Counters for a multi-day harvest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub days: usize,
    pub pages: usize,
    pub records: usize,
    pub articles: usize,
    pub deletions: usize,
    pub files_written: usize,
    pub last_date: Option<NaiveDate>,
}

impl HarvestStats {
    fn add_day(&mut self, day: &DayStats) {
        self.days += 1;
        self.pages += day.pages;
        self.records += day.records;
        self.articles += day.articles;
        self.deletions += day.deletions;
        self.files_written += day.files_written;
        self.last_date = day.date;
    }
}

impl From<DayStats> for HarvestStats {
    fn from(day: DayStats) -> Self {
        let mut stats = HarvestStats::default();
        stats.add_day(&day);
        stats
    }
}

pub struct Harvester {
    client: OaiClient,
    store: Arc<dyn ObjectStore>,
    checkpoint: Checkpoint,
    metadata_prefix: String,
    set: Option<String>,
    request_delay: Duration,
}

impl Harvester {
    pub fn new(
        config: &OaiConfig,
        store: Arc<dyn ObjectStore>,
        checkpoint: Checkpoint,
    ) -> EtlResult<Self> {
        Ok(Self {
            client: OaiClient::new(config)?,
            store,
            checkpoint,
            metadata_prefix: config.metadata_prefix.clone(),
            set: config.set.clone(),
            request_delay: config.request_delay(),
        })
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    /// Fetch, normalize and stage every page of `date`.
    ///
    /// Does not touch the checkpoint.
    #[instrument(skip(self), fields(date = %date))]
    pub async fn harvest_day(&self, date: NaiveDate) -> EtlResult<DayStats> {
        let mut stats = DayStats {
            date: Some(date),
            ..Default::default()
        };
        let mut request =
            ListRecordsRequest::for_day(date, self.metadata_prefix.clone(), self.set.clone());

        loop {
            let page = self.client.list_records(&request).await?;
            let suffix = page_suffix(request.resumption_token());

            stats.pages += 1;
            stats.records += page.records.len();

            let normalized = normalize_page(page.records);
            stats.articles += normalized.updates.articles.len();
            stats.deletions += normalized.deletions.len();

            let staged = write_page(self.store.as_ref(), date, &suffix, &normalized).await?;
            stats.files_written += staged.files_written();

            match page.resumption_token {
                Some(token) => {
                    tokio::time::sleep(self.request_delay).await;
                    request = ListRecordsRequest::resume(token);
                },
                None => break,
            }
        }

        info!(
            pages = stats.pages,
            records = stats.records,
            articles = stats.articles,
            deletions = stats.deletions,
            "Harvested day"
        );
        Ok(stats)
    }

    /// Harvest every day after the checkpoint that lies before `today`.
    ///
    /// The checkpoint is written after each completed day, so an error
    /// only costs the day it happened on.
    pub async fn run(&self, today: NaiveDate, max_days: Option<u32>) -> EtlResult<HarvestStats> {
        let mut stats = HarvestStats::default();

        while max_days.is_none_or(|max| stats.days < max as usize) {
            let Some(date) = self.checkpoint.next_day(today).await? else {
                break;
            };

            if stats.days > 0 {
                tokio::time::sleep(self.request_delay).await;
            }

            let day = match self.harvest_day(date).await {
                Ok(day) => day,
                Err(e) => {
                    error!(
                        date = %date,
                        error = %e,
                        protocol_code = e.protocol_code(),
                        "Harvest aborted, checkpoint not advanced"
                    );
                    return Err(e);
                },
            };

            self.checkpoint.write(date).await?;
            stats.add_day(&day);
        }

        info!(
            days = stats.days,
            pages = stats.pages,
            records = stats.records,
            last_date = ?stats.last_date,
            "Harvest finished"
        );
        Ok(stats)
    }
}
