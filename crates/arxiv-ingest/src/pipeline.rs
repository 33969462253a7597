//! One locked run: harvest, load, or both
//!
//! The run lock is taken before anything else. A harvest failure releases
//! it, since nothing was written to the database and the day is retried on
//! the next run. A load failure keeps it, so no later run touches the
//! database before an operator has looked at the failing file.

use std::sync::Arc;

use arxiv_common::{EtlError, EtlResult};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::harvest::{Checkpoint, HarvestStats, Harvester};
use crate::load::{LoadStats, Loader};
use crate::lock::RunLock;
use crate::staging::{pending_keys, StagedKind};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Harvest,
    Load,
    Full,
}

impl RunMode {
    pub fn harvests(self) -> bool {
        matches!(self, RunMode::Harvest | RunMode::Full)
    }

    pub fn loads(self) -> bool {
        matches!(self, RunMode::Load | RunMode::Full)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Days from here on are never harvested
    pub today: NaiveDate,
    pub max_days: Option<u32>,
    /// Harvest only this day and leave the checkpoint alone
    pub date: Option<NaiveDate>,
}

impl RunOptions {
    pub fn until(today: NaiveDate) -> Self {
        Self {
            today,
            max_days: None,
            date: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub harvest: Option<HarvestStats>,
    pub load: Option<LoadStats>,
}

/// Checkpoint, lock and backlog as seen from the bucket
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub checkpoint: Option<NaiveDate>,
    pub lock_held: bool,
    pub pending_update_files: usize,
    pub pending_deletion_files: usize,
}

pub struct Pipeline {
    lock: RunLock,
    harvester: Option<Harvester>,
    loader: Option<Loader>,
}

impl Pipeline {
    pub fn new(lock: RunLock) -> Self {
        Self {
            lock,
            harvester: None,
            loader: None,
        }
    }

    pub fn with_harvester(mut self, harvester: Harvester) -> Self {
        self.harvester = Some(harvester);
        self
    }

    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = Some(loader);
        self
    }

    #[instrument(skip(self, options))]
    pub async fn run(&self, mode: RunMode, options: RunOptions) -> EtlResult<RunReport> {
        let harvester = self.harvester.as_ref().filter(|_| mode.harvests());
        if mode.harvests() && harvester.is_none() {
            return Err(EtlError::Config(
                "harvesting needs a configured harvester".to_string(),
            ));
        }
        let loader = self.loader.as_ref().filter(|_| mode.loads());
        if mode.loads() && loader.is_none() {
            return Err(EtlError::Config(
                "loading needs a configured loader".to_string(),
            ));
        }

        self.lock.acquire().await?;
        let mut report = RunReport::default();

        if let Some(harvester) = harvester {
            let result = match options.date {
                Some(date) => harvester.harvest_day(date).await.map(HarvestStats::from),
                None => harvester.run(options.today, options.max_days).await,
            };

            match result {
                Ok(stats) => report.harvest = Some(stats),
                Err(e) => {
                    if let Err(release_error) = self.lock.release().await {
                        warn!(error = %release_error, "Failed to release run lock after harvest error");
                    }
                    return Err(e);
                },
            }
        }

        if let Some(loader) = loader {
            match loader.run().await {
                Ok(stats) => report.load = Some(stats),
                Err(e) => {
                    error!(
                        lock = %self.lock.key(),
                        error = %e,
                        "Load failed, run lock left in place for the operator"
                    );
                    return Err(e);
                },
            }
        }

        self.lock.release().await?;
        info!(?mode, "Run completed");
        Ok(report)
    }
}

pub async fn status(
    store: Arc<dyn ObjectStore>,
    checkpoint: &Checkpoint,
    lock: &RunLock,
) -> EtlResult<PipelineStatus> {
    Ok(PipelineStatus {
        checkpoint: checkpoint.read().await?,
        lock_held: lock.is_held().await?,
        pending_update_files: pending_keys(store.as_ref(), StagedKind::Updates).await?.len(),
        pending_deletion_files: pending_keys(store.as_ref(), StagedKind::Deletions)
            .await?
            .len(),
    })
}
